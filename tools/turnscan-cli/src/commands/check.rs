//! Show configuration and probe hardware.

use turnscan_capture_engine::backend::{connect_camera, connect_stage};
use turnscan_common::config::AppConfig;

pub fn run(
    config: &AppConfig,
    camera: &str,
    stage: &str,
    init_config: bool,
) -> anyhow::Result<()> {
    println!("Turnscan System Check");
    println!("{}", "=".repeat(50));

    let config_path = AppConfig::path();
    println!("Config file: {}", config_path.display());
    if init_config && !config_path.exists() {
        config.save()?;
        println!("[OK] Wrote default configuration");
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();

    match std::fs::create_dir_all(&config.captures_dir) {
        Ok(()) => println!("[OK] Captures directory: {}", config.captures_dir.display()),
        Err(e) => println!(
            "[FAIL] Captures directory {}: {e}",
            config.captures_dir.display()
        ),
    }

    let camera_ok = match connect_camera(camera) {
        Ok(_) => {
            println!("[OK] Camera: {camera}");
            true
        }
        Err(e) => {
            println!("[FAIL] Camera: {e}");
            false
        }
    };

    let stage_ok = match connect_stage(stage) {
        Ok(stage_controller) => {
            let position = stage_controller.position()?;
            let max_velocity = stage_controller.max_velocity()?;
            let acceleration = stage_controller.acceleration()?;
            println!(
                "[OK] Stage: {stage} at {position} deg (max {max_velocity} deg/s, accel {acceleration} deg/s^2)"
            );
            true
        }
        Err(e) => {
            println!("[FAIL] Stage: {e}");
            false
        }
    };

    println!();
    if camera_ok && stage_ok {
        println!("Hardware ready.");
    } else {
        println!("Some hardware is unavailable. See above.");
    }
    Ok(())
}
