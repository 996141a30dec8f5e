#![cfg_attr(all(not(debug_assertions), target_os = "windows"), windows_subsystem = "windows")]

use log::info;
use morphview::app::ReviewApp;
use morphview::{init_logger, Device, ModelManager, ReviewSession, RuntimeConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let device = Device::probe();
    info!("Using device: {}", device);
    let runtime = RuntimeConfig::default().with_device(device);

    let manager = ModelManager::new_default()?;
    info!("Model cache: {:?}", manager.models_dir());
    let session = ReviewSession::new(manager, runtime);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Model Review")
            .with_inner_size([1200.0, 600.0])
            .with_min_inner_size([800.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Model Review",
        native_options,
        Box::new(move |_cc| Ok(Box::new(ReviewApp::new(session)))),
    )?;
    Ok(())
}
