//! Build-time defaults for the firmware
//!
//! WiFi credentials and the telemetry collector are read from the
//! environment (or a `.env` file next to the workspace) and baked in as
//! compile-time strings. They only seed the SD card record on first boot;
//! an existing `WIFI.BIN` always wins.

const DEFAULTS: [(&str, &str); 3] = [
    ("WIFI_SSID", ""),
    ("WIFI_PASSWORD", ""),
    ("COLLECTOR_ADDR", "192.168.1.10:5140"),
];

fn main() {
    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for (key, default) in DEFAULTS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
