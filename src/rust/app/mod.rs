//! egui front end: controls on the left, the thumbnail grid in the middle and
//! the selected image with its class chart on the right.

mod chart;

use std::path::PathBuf;

use egui::{ColorImage, Sense, TextureHandle, TextureOptions};
use image::imageops::FilterType;
use image::RgbaImage;
use log::error;

use crate::classifier::ProbabilityVector;
use crate::gallery::{self, THUMBNAIL_SIZE};
use crate::models::CLASS_NAMES;
use crate::session::{LoadOutcome, ReviewSession};

/// Columns in the thumbnail grid.
pub const GRID_COLUMNS: usize = 5;
/// Side length of the preview image.
pub const PREVIEW_SIZE: u32 = 300;

struct GalleryEntry {
    path: PathBuf,
    texture: TextureHandle,
}

struct Selection {
    path: PathBuf,
    preview: TextureHandle,
    probabilities: ProbabilityVector,
}

/// The viewer window.
pub struct ReviewApp {
    session: ReviewSession,
    gallery: Vec<GalleryEntry>,
    selection: Option<Selection>,
    status: String,
    /// Set once loading a model fails; the window then only offers Quit.
    fatal: Option<String>,
}

impl ReviewApp {
    pub fn new(session: ReviewSession) -> Self {
        let status = format!("No model loaded ({})", session.runtime().device);
        Self {
            session,
            gallery: Vec::new(),
            selection: None,
            status,
            fatal: None,
        }
    }

    fn load_model(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Classifier weights", &["json"])
            .pick_file()
        else {
            return;
        };

        self.selection = None;
        match self.session.load_model(&path) {
            Ok(LoadOutcome::Loaded(info)) => {
                self.status = format!("{} ({}) on {}", info.identifier, info.architecture, info.device);
            }
            Ok(LoadOutcome::UnknownIdentifier(identifier)) => {
                self.status = format!("Unknown model '{}'; no model loaded", identifier);
            }
            Err(e) => {
                error!("Failed to load model from {:?}: {:#}", path, e);
                self.fatal = Some(format!("{:#}", e));
            }
        }
    }

    fn select_folder(&mut self, ctx: &egui::Context) {
        let Some(dir) = rfd::FileDialog::new().pick_folder() else {
            return;
        };

        self.selection = None;
        self.gallery.clear();
        let paths = match self.session.select_folder(&dir) {
            Ok(paths) => paths.to_vec(),
            Err(e) => {
                error!("Failed to read folder {:?}: {}", dir, e);
                self.status = format!("Cannot read {}", dir.display());
                return;
            }
        };
        if paths.is_empty() {
            self.status = "No images found in the selected folder.".to_string();
            return;
        }

        self.gallery = gallery::load_thumbnails(&paths, THUMBNAIL_SIZE)
            .into_iter()
            .map(|thumb| GalleryEntry {
                texture: ctx.load_texture(
                    thumb.path.to_string_lossy(),
                    to_color_image(&thumb.image),
                    TextureOptions::LINEAR,
                ),
                path: thumb.path,
            })
            .collect();
        self.status = format!("{} images in {}", self.gallery.len(), dir.display());
    }

    fn select_image(&mut self, ctx: &egui::Context, path: PathBuf) {
        self.selection = match self.session.predict(&path) {
            Ok(Some(prediction)) => {
                let preview = prediction
                    .image
                    .resize_exact(PREVIEW_SIZE, PREVIEW_SIZE, FilterType::Triangle)
                    .to_rgba8();
                Some(Selection {
                    preview: ctx.load_texture("preview", to_color_image(&preview), TextureOptions::LINEAR),
                    path,
                    probabilities: prediction.probabilities,
                })
            }
            Ok(None) => {
                self.status = "No model loaded.".to_string();
                None
            }
            Err(e) => {
                error!("{:#}", e);
                None
            }
        };
    }

    fn fatal_screen(ctx: &egui::Context, message: &str) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.heading("Failed to load model");
                ui.add_space(8.0);
                ui.label(message);
                ui.add_space(16.0);
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }

    fn controls(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("controls").resizable(false).show(ctx, |ui| {
            ui.add_space(8.0);
            if ui.button("Load Model").clicked() {
                self.load_model();
            }
            if ui.button("Select Folder").clicked() {
                self.select_folder(ctx);
            }
            ui.separator();
            ui.label(&self.status);
        });
    }

    fn preview(&self, ctx: &egui::Context) {
        egui::SidePanel::right("preview").min_width(440.0).show(ctx, |ui| {
            let Some(selection) = &self.selection else {
                ui.label("Select an image to classify it.");
                return;
            };
            let name = selection
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ui.label(name);
            ui.add(egui::Image::new(&selection.preview).fit_to_exact_size(egui::vec2(
                PREVIEW_SIZE as f32,
                PREVIEW_SIZE as f32,
            )));
            ui.add_space(8.0);
            chart::class_predictions(ui, &selection.probabilities, &CLASS_NAMES);
        });
    }

    /// Returns the path of a clicked thumbnail.
    fn thumbnails(&self, ctx: &egui::Context) -> Option<PathBuf> {
        let mut clicked = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                egui::Grid::new("thumbnails").spacing([6.0, 6.0]).show(ui, |ui| {
                    let size = egui::vec2(THUMBNAIL_SIZE as f32, THUMBNAIL_SIZE as f32);
                    for (i, entry) in self.gallery.iter().enumerate() {
                        let response = ui
                            .add(egui::Image::new(&entry.texture).fit_to_exact_size(size).sense(Sense::click()))
                            .on_hover_text(entry.path.display().to_string());
                        if response.clicked() {
                            clicked = Some(entry.path.clone());
                        }
                        if (i + 1) % GRID_COLUMNS == 0 {
                            ui.end_row();
                        }
                    }
                });
            });
        });
        clicked
    }
}

impl eframe::App for ReviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(message) = &self.fatal {
            Self::fatal_screen(ctx, message);
            return;
        }

        self.controls(ctx);
        self.preview(ctx);
        if let Some(path) = self.thumbnails(ctx) {
            self.select_image(ctx, path);
        }
    }
}

fn to_color_image(image: &RgbaImage) -> ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, image.as_raw())
}
