use crate::vehicle::{StateField, UnitSettings};

/// Home Assistant MQTT component kinds used by the vehicle device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Sensor,
    BinarySensor,
    Switch,
    Number,
    DeviceTracker,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Sensor => "sensor",
            Component::BinarySensor => "binary_sensor",
            Component::Switch => "switch",
            Component::Number => "number",
            Component::DeviceTracker => "device_tracker",
        }
    }
}

/// Unit of measurement, either fixed or following TeslaMate's settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    None,
    Fixed(&'static str),
    Length,
    Temperature,
}

impl Unit {
    pub fn resolve(&self, units: &UnitSettings) -> Option<&'static str> {
        match self {
            Unit::None => None,
            Unit::Fixed(symbol) => Some(*symbol),
            Unit::Length => Some(units.length_symbol()),
            Unit::Temperature => Some(units.temperature_symbol()),
        }
    }
}

/// Static definition of one exposed entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityDescriptor {
    pub object_id: &'static str,
    pub component: Component,
    pub name: &'static str,
    /// Field published on the entity's state topic
    pub state_field: StateField,
    /// Field published as the JSON attribute document, if any
    pub attributes_field: Option<StateField>,
    pub unit: Unit,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub icon: Option<&'static str>,
    /// Writable entities get `<base>/<vin>/<object_id>/set`
    pub writable: bool,
    /// (min, max) for number entities
    pub range: Option<(u8, u8)>,
}

impl EntityDescriptor {
    const fn sensor(object_id: &'static str, name: &'static str, field: StateField) -> Self {
        Self {
            object_id,
            component: Component::Sensor,
            name,
            state_field: field,
            attributes_field: None,
            unit: Unit::None,
            device_class: None,
            state_class: None,
            icon: None,
            writable: false,
            range: None,
        }
    }

    const fn measurement(mut self, unit: Unit, device_class: Option<&'static str>) -> Self {
        self.unit = unit;
        self.device_class = device_class;
        self.state_class = Some("measurement");
        self
    }

    const fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    const fn component(mut self, component: Component) -> Self {
        self.component = component;
        self
    }
}

/// Charge limit bounds accepted by the vehicle API.
pub const CHARGE_LIMIT_MIN: u8 = 50;
pub const CHARGE_LIMIT_MAX: u8 = 100;

/// The fixed entity set of the vehicle device, in publish order.
pub const ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor::sensor("battery_level", "Battery Level", StateField::BatteryLevel)
        .measurement(Unit::Fixed("%"), Some("battery")),
    EntityDescriptor {
        unit: Unit::Fixed("%"),
        icon: Some("mdi:battery-charging-80"),
        writable: true,
        range: Some((CHARGE_LIMIT_MIN, CHARGE_LIMIT_MAX)),
        ..EntityDescriptor::sensor("charge_limit_soc", "Charge Limit", StateField::ChargeLimitSoc)
            .component(Component::Number)
    },
    EntityDescriptor {
        writable: true,
        ..EntityDescriptor::sensor("charging", "Charging", StateField::Charging)
            .component(Component::Switch)
            .icon("mdi:ev-station")
    },
    EntityDescriptor {
        attributes_field: Some(StateField::Location),
        ..EntityDescriptor::sensor("location", "Location", StateField::Presence)
            .component(Component::DeviceTracker)
            .icon("mdi:crosshairs-gps")
    },
    EntityDescriptor::sensor("state", "State", StateField::VehicleState).icon("mdi:gauge"),
    EntityDescriptor::sensor("geofence", "Geofence", StateField::Geofence).icon("mdi:map-marker"),
    EntityDescriptor {
        state_class: Some("total_increasing"),
        ..EntityDescriptor::sensor("odometer", "Odometer", StateField::Odometer)
            .measurement(Unit::Length, Some("distance"))
            .icon("mdi:counter")
    },
    EntityDescriptor::sensor("inside_temp", "Inside Temperature", StateField::InsideTemp)
        .measurement(Unit::Temperature, Some("temperature")),
    EntityDescriptor::sensor("outside_temp", "Outside Temperature", StateField::OutsideTemp)
        .measurement(Unit::Temperature, Some("temperature")),
    EntityDescriptor::sensor("charger_power", "Charger Power", StateField::ChargerPower)
        .measurement(Unit::Fixed("kW"), Some("power")),
    EntityDescriptor::sensor("charger_voltage", "Charger Voltage", StateField::ChargerVoltage)
        .measurement(Unit::Fixed("V"), Some("voltage")),
    EntityDescriptor::sensor(
        "charger_actual_current",
        "Charger Current",
        StateField::ChargerActualCurrent,
    )
    .measurement(Unit::Fixed("A"), Some("current")),
    EntityDescriptor::sensor("time_to_full_charge", "Time to Full", StateField::TimeToFullCharge)
        .measurement(Unit::Fixed("h"), None)
        .icon("mdi:clock-fast"),
    EntityDescriptor::sensor(
        "est_battery_range",
        "Estimated Battery Range",
        StateField::EstBatteryRange,
    )
    .measurement(Unit::Length, Some("distance")),
    EntityDescriptor::sensor(
        "ideal_battery_range",
        "Ideal Battery Range",
        StateField::IdealBatteryRange,
    )
    .measurement(Unit::Length, Some("distance")),
    EntityDescriptor::sensor("plugged_in", "Plugged In", StateField::PluggedIn)
        .component(Component::BinarySensor)
        .icon("mdi:power-plug"),
];

/// Descriptor of a writable entity, by object id.
pub fn writable(object_id: &str) -> Option<&'static EntityDescriptor> {
    ENTITIES
        .iter()
        .find(|e| e.writable && e.object_id == object_id)
}
