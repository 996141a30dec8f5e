use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use egui::epaint::TextShape;
use egui::{pos2, vec2, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Ui};

use crate::classifier::ProbabilityVector;

const BAR_COLOR: Color32 = Color32::from_rgb(31, 119, 180);
const CHART_HEIGHT: f32 = 340.0;

// room for the title, the y-axis label and the rotated class names
const MARGIN_TOP: f32 = 28.0;
const MARGIN_LEFT: f32 = 56.0;
const MARGIN_RIGHT: f32 = 12.0;
const MARGIN_BOTTOM: f32 = 120.0;

/// Draws a bar chart of `probabilities` labeled with `names`.
///
/// Only `min(probabilities, names)` bars are drawn.
pub fn class_predictions(ui: &mut Ui, probabilities: &ProbabilityVector, names: &[&str]) {
    let width = ui.available_width().max(240.0);
    let (rect, _) = ui.allocate_exact_size(vec2(width, CHART_HEIGHT), Sense::hover());
    let painter = ui.painter_at(rect);
    let text_color = ui.visuals().text_color();
    let axis = Stroke::new(1.0, ui.visuals().weak_text_color());

    painter.text(
        pos2(rect.center().x, rect.top() + 4.0),
        Align2::CENTER_TOP,
        "Class Predictions",
        FontId::proportional(15.0),
        text_color,
    );

    let plot = Rect::from_min_max(
        pos2(rect.left() + MARGIN_LEFT, rect.top() + MARGIN_TOP),
        pos2(rect.right() - MARGIN_RIGHT, rect.bottom() - MARGIN_BOTTOM),
    );
    let y_of = |p: f32| plot.bottom() - p.clamp(0.0, 1.0) * plot.height();

    // y axis with ticks every 0.2
    painter.line_segment([plot.left_bottom(), plot.left_top()], axis);
    for tick in 0..=5 {
        let value = tick as f32 * 0.2;
        let y = y_of(value);
        painter.line_segment([pos2(plot.left() - 4.0, y), pos2(plot.left(), y)], axis);
        painter.text(
            pos2(plot.left() - 6.0, y),
            Align2::RIGHT_CENTER,
            format!("{:.1}", value),
            FontId::proportional(10.0),
            text_color,
        );
    }
    let y_label = painter.layout_no_wrap("Probability".to_string(), FontId::proportional(12.0), text_color);
    let y_label_pos = pos2(rect.left() + 2.0, plot.center().y + y_label.size().x / 2.0);
    painter.add(TextShape::new(y_label_pos, y_label, text_color).with_angle(-FRAC_PI_2));

    painter.line_segment([plot.left_bottom(), plot.right_bottom()], axis);
    painter.text(
        pos2(plot.center().x, rect.bottom() - 2.0),
        Align2::CENTER_BOTTOM,
        "Classes",
        FontId::proportional(12.0),
        text_color,
    );

    let bars = probabilities.labeled(names);
    if bars.is_empty() {
        return;
    }
    let slot = plot.width() / bars.len() as f32;
    let (dx, dy) = ((-FRAC_PI_4).cos(), (-FRAC_PI_4).sin());

    for (i, (name, p)) in bars.into_iter().enumerate() {
        let center_x = plot.left() + slot * (i as f32 + 0.5);
        let bar = Rect::from_min_max(
            pos2(center_x - slot * 0.4, y_of(p)),
            pos2(center_x + slot * 0.4, plot.bottom()),
        );
        painter.rect_filled(bar, 0.0, BAR_COLOR);

        // rotated 45 degrees so the label ends at its tick
        let galley = painter.layout_no_wrap(name.to_string(), FontId::proportional(10.0), text_color);
        let len = galley.size().x;
        let anchor = Pos2::new(center_x, plot.bottom() + 4.0);
        let start = pos2(anchor.x - dx * len, anchor.y - dy * len);
        painter.add(TextShape::new(start, galley, text_color).with_angle(-FRAC_PI_4));
    }
}
