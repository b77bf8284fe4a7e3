use eframe::egui;
use egui::{Color32, CornerRadius, RichText, Stroke};

pub struct AppTheme {
    pub background: Color32,
    pub card_background: Color32,
    pub text: Color32,
    pub secondary_text: Color32,
    pub highlight: Color32,
    pub accent: Color32,
    pub separator: Color32,
    pub danger: Color32,
    pub button_background: Color32,
    pub button_foreground: Color32,
    pub button_active_background: Color32,
    pub button_hover_background: Color32,
}

impl AppTheme {
    pub fn dark() -> Self {
        Self {
            background: Color32::from_rgb(18, 18, 18),
            card_background: Color32::from_rgb(30, 30, 30),
            text: Color32::from_rgb(240, 240, 240),
            secondary_text: Color32::from_rgb(180, 180, 180),
            highlight: Color32::from_rgb(97, 175, 239),
            accent: Color32::from_rgb(152, 195, 121),
            separator: Color32::from_rgb(60, 60, 60),
            danger: Color32::from_rgb(229, 115, 115),
            button_background: Color32::from_rgb(66, 66, 66),
            button_foreground: Color32::from_rgb(240, 240, 240),
            button_active_background: Color32::from_rgb(97, 175, 239),
            button_hover_background: Color32::from_rgb(80, 80, 80),
        }
    }

    pub fn light() -> Self {
        Self {
            background: Color32::from_rgb(245, 245, 245),
            card_background: Color32::from_rgb(255, 255, 255),
            text: Color32::from_rgb(20, 20, 20),
            secondary_text: Color32::from_rgb(90, 90, 90),
            highlight: Color32::from_rgb(25, 103, 210),
            accent: Color32::from_rgb(46, 125, 50),
            separator: Color32::from_rgb(200, 200, 200),
            danger: Color32::from_rgb(198, 40, 40),
            button_background: Color32::from_rgb(235, 235, 235),
            button_foreground: Color32::from_rgb(20, 20, 20),
            button_active_background: Color32::from_rgb(25, 103, 210),
            button_hover_background: Color32::from_rgb(210, 210, 210),
        }
    }

    pub fn for_mode(is_dark_mode: bool) -> Self {
        if is_dark_mode {
            Self::dark()
        } else {
            Self::light()
        }
    }

    pub fn apply_to_ctx(&self, ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        style.visuals.panel_fill = self.background;
        style.visuals.window_fill = self.card_background;
        style.visuals.window_stroke = Stroke::new(1.0, self.separator);
        style.visuals.widgets.noninteractive.bg_fill = self.card_background;
        style.visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, self.text);

        style.visuals.widgets.inactive.bg_fill = self.button_background;
        style.visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, self.button_foreground);
        style.visuals.widgets.active.bg_fill = self.button_active_background;
        style.visuals.widgets.active.fg_stroke = Stroke::new(1.0, self.button_foreground);
        style.visuals.widgets.hovered.bg_fill = self.button_hover_background;
        style.visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, self.button_foreground);

        style.visuals.selection.bg_fill = self.highlight;
        style.visuals.selection.stroke = Stroke::new(1.0, self.highlight);
        style.visuals.hyperlink_color = self.highlight;

        style.visuals.window_corner_radius = CornerRadius::same(8);
        style.visuals.menu_corner_radius = CornerRadius::same(6);
        style.visuals.widgets.noninteractive.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.inactive.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.hovered.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.active.corner_radius = CornerRadius::same(4);

        let is_light_theme = self.background.r() > 128 && self.background.g() > 128 && self.background.b() > 128;
        if is_light_theme {
            style.visuals.window_shadow = egui::epaint::Shadow {
                offset: [3, 3],
                blur: 12,
                spread: 2,
                color: Color32::from_rgba_premultiplied(0, 0, 0, 20),
            };
        } else {
            style.visuals.window_shadow = egui::epaint::Shadow {
                offset: [2, 2],
                blur: 10,
                spread: 1,
                color: Color32::from_rgba_premultiplied(0, 0, 0, 40),
            };
        }

        ctx.set_style(style);
    }

    /// Card frame used for posts, columns and comments.
    pub fn card(&self) -> egui::Frame {
        egui::Frame::new()
            .fill(self.card_background)
            .corner_radius(CornerRadius::same(6))
            .stroke(Stroke::new(1.0, self.separator))
            .inner_margin(12.0)
            .outer_margin(egui::vec2(8.0, 4.0))
    }

    /// Alternates shading so nested replies stay distinguishable.
    pub fn comment_background(&self, depth: usize) -> Color32 {
        let c = self.card_background;
        if depth % 2 == 0 {
            c
        } else if c.r() > 128 {
            Color32::from_rgb(c.r().saturating_sub(10), c.g().saturating_sub(10), c.b().saturating_sub(10))
        } else {
            Color32::from_rgb(c.r().saturating_add(10), c.g().saturating_add(10), c.b().saturating_add(10))
        }
    }

    pub fn button(&self, label: &str) -> egui::Button<'static> {
        egui::Button::new(RichText::new(label).color(self.button_foreground).size(15.0))
            .min_size(egui::Vec2::new(72.0, 30.0))
            .corner_radius(CornerRadius::same(6))
            .fill(self.button_background)
    }

    pub fn primary_button(&self, label: &str) -> egui::Button<'static> {
        egui::Button::new(RichText::new(label).color(Color32::WHITE).strong().size(15.0))
            .min_size(egui::Vec2::new(88.0, 30.0))
            .corner_radius(CornerRadius::same(6))
            .fill(self.button_active_background)
    }

    /// Highlighted when `active` is the current page.
    pub fn nav_button(&self, label: &str, active: bool) -> egui::Button<'static> {
        let text = RichText::new(label).size(16.0);
        let text = if active {
            text.color(self.highlight).strong()
        } else {
            text.color(self.button_foreground)
        };
        egui::Button::new(text)
            .min_size(egui::Vec2::new(72.0, 32.0))
            .corner_radius(CornerRadius::same(6))
            .fill(self.button_background)
    }
}
