use graph_chat::gui::frontend::ChatApp;
use graph_chat::persistence::settings::AppSettings;

use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();
    let settings = AppSettings::load().unwrap_or_else(|e| {
        log::warn!("settings unreadable, using defaults: {:#}", e);
        AppSettings::default()
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Graph-Chat")
            .with_inner_size([1300.0, 760.0])
            // Provide sensible bounds so the UI stays usable on small screens
            .with_min_inner_size([700.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Graph-Chat",
        options,
        Box::new(move |_cc| Ok(Box::new(ChatApp::new(settings)) as Box<dyn eframe::App>)),
    )
}
