use super::*;
use chrono::{TimeZone, Utc};

fn reading() -> VehicleReading {
    VehicleReading {
        date: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
        latitude: Some(52.5200),
        longitude: Some(13.4050),
        heading: Some(90.0),
        speed: Some(0.0),
        elevation: Some(34.0),
        geofence: Some("Home".to_string()),
        battery_level: Some(76),
        charge_limit_soc: Some(80),
        plugged_in: Some(true),
        charging: false,
        driving: false,
        odometer: Some(12345.678),
        est_battery_range_km: Some(300.0),
        ideal_battery_range_km: Some(350.0),
        inside_temp: Some(21.5),
        outside_temp: Some(10.0),
        charger_power: None,
        charger_voltage: None,
        charger_actual_current: None,
        time_to_full_charge: None,
        state: Some("online".to_string()),
    }
}

#[test]
fn test_geofence_home_maps_to_home() {
    assert_eq!(Presence::from_geofence(Some("Home"), "Home"), Presence::Home);
    assert_eq!(Presence::from_geofence(Some("home"), "Home"), Presence::Home);
}

#[test]
fn test_other_geofence_or_none_maps_to_not_home() {
    assert_eq!(Presence::from_geofence(Some("Work"), "Home"), Presence::NotHome);
    assert_eq!(Presence::from_geofence(None, "Home"), Presence::NotHome);
    assert_eq!(Presence::from_geofence(Some(""), "Home"), Presence::NotHome);
}

#[test]
fn test_custom_home_fence_name() {
    assert_eq!(Presence::from_geofence(Some("Casa"), "Casa"), Presence::Home);
    assert_eq!(Presence::from_geofence(Some("Home"), "Casa"), Presence::NotHome);
}

#[test]
fn test_snapshot_from_reading() {
    let snapshot = Snapshot::from_reading("VIN1", &reading(), "Home", &UnitSettings::default());

    assert_eq!(snapshot.vin, "VIN1");
    assert_eq!(
        snapshot.get(StateField::Presence),
        Some(&FieldValue::Text("home".to_string()))
    );
    assert_eq!(snapshot.get(StateField::Charging), Some(&FieldValue::Switch(false)));
    assert_eq!(snapshot.get(StateField::ChargeLimitSoc), Some(&FieldValue::Integer(80)));
    assert_eq!(snapshot.get(StateField::Odometer), Some(&FieldValue::Number(12345.68)));
    assert_eq!(
        snapshot.get(StateField::VehicleState),
        Some(&FieldValue::Text("online".to_string()))
    );
    // No charger values while not charging
    assert!(snapshot.get(StateField::ChargerPower).is_none());
}

#[test]
fn test_snapshot_without_position_still_has_presence() {
    let mut r = reading();
    r.latitude = None;
    r.geofence = None;

    let snapshot = Snapshot::from_reading("VIN1", &r, "Home", &UnitSettings::default());
    assert!(snapshot.get(StateField::Location).is_none());
    assert_eq!(
        snapshot.get(StateField::Presence),
        Some(&FieldValue::Text("not_home".to_string()))
    );
    assert_eq!(
        snapshot.get(StateField::Geofence),
        Some(&FieldValue::Text(NO_GEOFENCE.to_string()))
    );
}

#[test]
fn test_blank_geofence_and_state_are_never_empty_payloads() {
    let mut r = reading();
    r.geofence = Some("  ".to_string());
    r.state = Some(String::new());

    let snapshot = Snapshot::from_reading("VIN1", &r, "Home", &UnitSettings::default());
    assert_eq!(
        snapshot.get(StateField::Geofence),
        Some(&FieldValue::Text("none".to_string()))
    );
    assert!(snapshot.get(StateField::VehicleState).is_none());
    assert!(snapshot.fields().all(|(_, value)| !value.to_payload().is_empty()));
}

#[test]
fn test_charging_overrides_vehicle_state() {
    let mut r = reading();
    r.charging = true;

    let snapshot = Snapshot::from_reading("VIN1", &r, "Home", &UnitSettings::default());
    assert_eq!(snapshot.get(StateField::Charging), Some(&FieldValue::Switch(true)));
    assert_eq!(
        snapshot.get(StateField::VehicleState),
        Some(&FieldValue::Text("charging".to_string()))
    );
}

#[test]
fn test_imperial_units_converted() {
    let units = UnitSettings::from_teslamate("mi", "F");
    let snapshot = Snapshot::from_reading("VIN1", &reading(), "Home", &units);

    assert_eq!(snapshot.get(StateField::OutsideTemp), Some(&FieldValue::Number(50.0)));
    assert_eq!(
        snapshot.get(StateField::EstBatteryRange),
        Some(&FieldValue::Number(186.41))
    );
    assert_eq!(units.length_symbol(), "mi");
    assert_eq!(units.temperature_symbol(), "°F");
}

#[test]
fn test_position_jitter_within_tolerance() {
    let a = Position {
        latitude: 52.520000,
        longitude: 13.405000,
        heading: 0.0,
        speed: 0.0,
        elevation: 0.0,
    };
    // ~1.1 m north
    let b = Position {
        latitude: 52.520010,
        heading: 180.0,
        ..a
    };
    // ~111 m north
    let c = Position {
        latitude: 52.521000,
        ..a
    };

    assert!(!FieldValue::Position(b).differs_from(&FieldValue::Position(a), 10.0));
    assert!(FieldValue::Position(c).differs_from(&FieldValue::Position(a), 10.0));
    assert!(!FieldValue::Position(a).differs_from(&FieldValue::Position(a), 0.0));
}

#[test]
fn test_discrete_values_compare_exactly() {
    let home = FieldValue::Text("home".to_string());
    let away = FieldValue::Text("not_home".to_string());
    assert!(away.differs_from(&home, 1000.0));
    assert!(!home.differs_from(&home.clone(), 1000.0));
}

#[test]
fn test_payload_rendering() {
    assert_eq!(FieldValue::Switch(true).to_payload(), "ON");
    assert_eq!(FieldValue::Switch(false).to_payload(), "OFF");
    assert_eq!(FieldValue::Integer(80).to_payload(), "80");
    assert_eq!(FieldValue::Number(21.5).to_payload(), "21.5");

    let payload = FieldValue::Position(Position {
        latitude: 1.5,
        longitude: 2.5,
        heading: 3.0,
        speed: 0.0,
        elevation: 4.0,
    })
    .to_payload();
    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["latitude"], 1.5);
    assert_eq!(json["longitude"], 2.5);
    assert_eq!(json["gps_accuracy"], 1);
}

#[test]
fn test_display_name_falls_back_to_vin() {
    let mut identity = VehicleIdentity {
        vin: "VIN1".to_string(),
        car_id: 1,
        api_id: 42,
        name: "  ".to_string(),
        model: "Model 3 LR".to_string(),
    };
    assert_eq!(identity.display_name(), "VIN1");
    identity.name = "Blue".to_string();
    assert_eq!(identity.display_name(), "Blue");
}
