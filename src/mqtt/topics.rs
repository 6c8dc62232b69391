use crate::vehicle::StateField;

/// Topic layout for one vehicle.
///
/// State:     `<base>/<vin>/<field>`
/// Command:   `<base>/<vin>/<object_id>/set`
/// Discovery: `<prefix>/<component>/<vin>/<object_id>/config`
#[derive(Clone, Debug, PartialEq)]
pub struct Topics {
    base: String,
    discovery_prefix: String,
    vin: String,
}

impl Topics {
    pub fn new(base_topic: &str, discovery_prefix: &str, vin: &str) -> Self {
        Self {
            base: base_topic.trim_end_matches('/').to_string(),
            discovery_prefix: discovery_prefix.trim_end_matches('/').to_string(),
            vin: vin.to_string(),
        }
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn state(&self, field: StateField) -> String {
        format!("{}/{}/{}", self.base, self.vin, field.topic_suffix())
    }

    pub fn command(&self, object_id: &str) -> String {
        format!("{}/{}/{}/set", self.base, self.vin, object_id)
    }

    /// Subscription filter covering every command topic of the vehicle
    pub fn command_filter(&self) -> String {
        self.command("+")
    }

    pub fn discovery(&self, component: &str, object_id: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix, component, self.vin, object_id
        )
    }

    /// Object id addressed by a command topic of this vehicle, `None` for
    /// anything else (including another VIN's command topic).
    pub fn command_object_id<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let rest = topic
            .strip_prefix(self.base.as_str())?
            .strip_prefix('/')?
            .strip_prefix(self.vin.as_str())?
            .strip_prefix('/')?;
        let object_id = rest.strip_suffix("/set")?;
        if object_id.is_empty() || object_id.contains('/') {
            return None;
        }
        Some(object_id)
    }

    /// TeslaMate's own per-car topics
    pub fn teslamate_filter(car_id: i64) -> String {
        format!("teslamate/cars/{}/+", car_id)
    }

    /// Key of a TeslaMate topic of `car_id` (`charge_limit_soc` for
    /// `teslamate/cars/<id>/charge_limit_soc`), `None` for anything else.
    pub fn teslamate_key(topic: &str, car_id: i64) -> Option<&str> {
        topic
            .strip_prefix(&format!("teslamate/cars/{}/", car_id))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
    }

    pub fn is_teslamate(topic: &str, car_id: i64) -> bool {
        Self::teslamate_key(topic, car_id).is_some()
    }
}
