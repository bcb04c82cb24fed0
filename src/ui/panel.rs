//! Viewer overlays: controls panel, status banner and coordinate readout
//!
//! Panels only read the session. Buttons produce [`PanelAction`]s that the
//! app applies once the UI frame is built, so the session is never borrowed
//! mutably while ImGui holds it.

use winit::keyboard::KeyCode;

use crate::viewer::{SessionStatus, ViewerSession};

/// A control the user triggered from the panel or keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    ToggleWireframe,
    ToggleAutoRotate,
    ResetCamera,
    ToggleCoordinates,
}

impl PanelAction {
    /// Keyboard shortcut for each control
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyW => Some(Self::ToggleWireframe),
            KeyCode::KeyR => Some(Self::ToggleAutoRotate),
            KeyCode::KeyC => Some(Self::ResetCamera),
            KeyCode::KeyP => Some(Self::ToggleCoordinates),
            _ => None,
        }
    }

    pub fn apply(self, session: &mut ViewerSession) {
        match self {
            Self::ToggleWireframe => {
                session.toggle_wireframe();
            }
            Self::ToggleAutoRotate => {
                session.toggle_auto_rotate();
            }
            Self::ResetCamera => {
                session.reset_camera();
            }
            Self::ToggleCoordinates => session.toggle_coordinates(),
        }
    }
}

/// Draws every overlay and collects triggered controls into `actions`
pub fn viewer_overlay(ui: &imgui::Ui, session: &ViewerSession, actions: &mut Vec<PanelAction>) {
    let display_size = ui.io().display_size;
    if display_size[0] <= 0.0 || display_size[1] <= 0.0 {
        return;
    }

    status_banner(ui, session, display_size);
    if session.config().show_controls && session.status().is_ready() {
        controls_panel(ui, session, actions);
    }
    if let Some(text) = session.coordinates_text() {
        ui.window("Camera")
            .position([20.0, display_size[1] - 60.0], imgui::Condition::Always)
            .title_bar(false)
            .resizable(false)
            .movable(false)
            .always_auto_resize(true)
            .build(|| ui.text(&text));
    }
}

/// Status line; in the error state it covers the viewport center
fn status_banner(ui: &imgui::Ui, session: &ViewerSession, display_size: [f32; 2]) {
    let text = session.status_text();
    match session.status() {
        SessionStatus::Error(_) => {
            ui.window("Error")
                .position(
                    [display_size[0] * 0.5, display_size[1] * 0.5],
                    imgui::Condition::Always,
                )
                .position_pivot([0.5, 0.5])
                .resizable(false)
                .movable(false)
                .collapsible(false)
                .always_auto_resize(true)
                .build(|| {
                    ui.text_colored([1.0, 0.45, 0.4, 1.0], "Could not show this model");
                    ui.separator();
                    ui.text_wrapped(&text);
                });
        }
        SessionStatus::Idle => {}
        _ => {
            ui.window("Status")
                .position([display_size[0] * 0.5, 16.0], imgui::Condition::Always)
                .position_pivot([0.5, 0.0])
                .title_bar(false)
                .resizable(false)
                .movable(false)
                .always_auto_resize(true)
                .build(|| {
                    ui.text(&text);
                    if let SessionStatus::Loading { progress } = session.status() {
                        imgui::ProgressBar::new(*progress as f32 / 100.0)
                            .size([240.0, 0.0])
                            .build(ui);
                    }
                });
        }
    }
}

fn controls_panel(ui: &imgui::Ui, session: &ViewerSession, actions: &mut Vec<PanelAction>) {
    ui.window("Controls")
        .position([20.0, 20.0], imgui::Condition::FirstUseEver)
        .size([260.0, 0.0], imgui::Condition::FirstUseEver)
        .resizable(false)
        .collapsible(true)
        .build(|| {
            let mut wireframe = session.is_wireframe();
            if ui.checkbox("Wireframe (W)", &mut wireframe) {
                actions.push(PanelAction::ToggleWireframe);
            }
            let mut rotating = session.is_auto_rotating();
            if ui.checkbox("Auto-rotate (R)", &mut rotating) {
                actions.push(PanelAction::ToggleAutoRotate);
            }
            let mut coordinates = session.coordinates_text().is_some();
            if ui.checkbox("Coordinates (P)", &mut coordinates) {
                actions.push(PanelAction::ToggleCoordinates);
            }
            if ui.button("Reset camera (C)") {
                actions.push(PanelAction::ResetCamera);
            }

            if let Some(summary) = session.summary() {
                ui.separator();
                ui.text(format!("{:?} model", summary.format));
                ui.text(format!("Meshes: {}", summary.mesh_count));
                ui.text(format!("Vertices: {}", summary.vertex_count));
                ui.text(format!("Faces: {}", summary.face_count));
                let [x, y, z] = summary.dimensions;
                ui.text(format!("Size: {:.3} x {:.3} x {:.3}", x, y, z));
                ui.text(format!("Scale: {:.4}", summary.scale));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_map_to_controls() {
        assert_eq!(PanelAction::from_key(KeyCode::KeyW), Some(PanelAction::ToggleWireframe));
        assert_eq!(PanelAction::from_key(KeyCode::KeyR), Some(PanelAction::ToggleAutoRotate));
        assert_eq!(PanelAction::from_key(KeyCode::KeyC), Some(PanelAction::ResetCamera));
        assert_eq!(PanelAction::from_key(KeyCode::KeyP), Some(PanelAction::ToggleCoordinates));
        assert_eq!(PanelAction::from_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn coordinate_toggle_works_before_a_model_loads() {
        let mut session = ViewerSession::new(crate::config::ViewerConfig::default());
        PanelAction::ToggleCoordinates.apply(&mut session);
        assert!(session.coordinates_text().is_some());
        PanelAction::ToggleCoordinates.apply(&mut session);
        assert!(session.coordinates_text().is_none());
    }
}
