//! CPU temperature sensor selection
//!
//! Sensors are matched by driver name against the component label reported
//! by the OS (`coretemp Package id 0`, `k10temp Tctl`, ...). The configured
//! list is an ordered priority list: the first name with a matching component
//! that reports a temperature wins.

/// A component reading, decoupled from `sysinfo` so selection is testable
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub label: String,
    pub temperature: Option<f32>,
}

pub fn select_cpu_temperature(priority: &[String], readings: &[SensorReading]) -> Option<f64> {
    priority.iter().find_map(|sensor| {
        let sensor = sensor.to_lowercase();
        readings
            .iter()
            .filter(|r| r.label.to_lowercase().contains(&sensor))
            .find_map(|r| r.temperature)
            .filter(|t| t.is_finite())
            .map(f64::from)
    })
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}
