use anyhow::Result;
use cgmath::Vector3;
use clap::Parser;

use haggis_viewer::{
    app::ViewerApp,
    config::{DragPolicy, ViewerConfig},
    loader::{LoadRequest, ModelSource},
};

#[derive(Parser, Debug)]
#[command(name = "haggis-viewer")]
#[command(about = "Interactive viewer for glTF, GLB, OBJ, FBX and STL models")]
struct Cli {
    /// Model path or http(s) URL
    source: String,

    /// File name whose extension selects the format, defaults to the source's
    #[arg(long)]
    name: Option<String>,

    /// Byte size of the model, used for progress when the source reports none
    #[arg(long)]
    size: Option<u64>,

    #[arg(long, default_value = "1200")]
    width: u32,

    #[arg(long, default_value = "800")]
    height: u32,

    /// Start with auto-rotate enabled
    #[arg(long)]
    auto_rotate: bool,

    /// Hide the controls panel
    #[arg(long)]
    no_controls: bool,

    /// Background color as "r,g,b" in 0..1
    #[arg(long, value_parser = parse_triple)]
    background: Option<[f32; 3]>,

    /// Fixed model scale instead of fitting to the canonical size
    #[arg(long)]
    scale: Option<f32>,

    /// Initial camera position as "x,y,z"
    #[arg(long, value_parser = parse_triple)]
    camera: Option<[f32; 3]>,

    /// Start with the camera coordinate readout visible
    #[arg(long)]
    coordinates: bool,

    /// Pause auto-rotate while dragging
    #[arg(long)]
    suspend_on_drag: bool,
}

impl Cli {
    fn config(&self) -> ViewerConfig {
        let mut config = ViewerConfig::default()
            .with_size(self.width, self.height)
            .with_auto_rotate(self.auto_rotate)
            .with_controls(!self.no_controls)
            .with_coordinates(self.coordinates);
        if let Some([r, g, b]) = self.background {
            config = config.with_background(r, g, b);
        }
        if let Some(scale) = self.scale {
            config = config.with_model_scale(scale);
        }
        if let Some(position) = self.camera {
            config = config.with_camera_position(Vector3::from(position));
        }
        if self.suspend_on_drag {
            config = config.with_drag_policy(DragPolicy::SuspendWhileDragging);
        }
        config
    }

    fn request(&self) -> LoadRequest {
        let mut request = LoadRequest::new(ModelSource::parse(&self.source));
        if let Some(name) = &self.name {
            request = request.with_filename(name);
        }
        if let Some(size) = self.size {
            request = request.with_declared_size(size);
        }
        request
    }
}

fn parse_triple(value: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected three comma separated numbers, got '{}'", value));
    };
    let parse = |s: &str| {
        s.parse::<f32>()
            .map_err(|e| format!("invalid number '{}': {}", s, e))
    };
    Ok([parse(*x)?, parse(*y)?, parse(*z)?])
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let app = ViewerApp::new(cli.config(), cli.request())?;
    app.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_triples() {
        assert_eq!(parse_triple("0.1, 0.2,0.3"), Ok([0.1, 0.2, 0.3]));
        assert!(parse_triple("1,2").is_err());
        assert!(parse_triple("1,x,3").is_err());
    }

    #[test]
    fn flags_map_onto_the_config() {
        let cli = Cli::parse_from([
            "haggis-viewer",
            "https://example.com/model?id=7",
            "--name",
            "robot.glb",
            "--scale",
            "0.5",
            "--camera",
            "1,2,3",
            "--no-controls",
            "--suspend-on-drag",
        ]);
        let config = cli.config();
        assert_eq!(config.model_scale, Some(0.5));
        assert_eq!(config.camera_position, Some(Vector3::new(1.0, 2.0, 3.0)));
        assert!(!config.show_controls);
        assert_eq!(config.drag_policy, DragPolicy::SuspendWhileDragging);

        let request = cli.request();
        assert_eq!(request.filename, "robot.glb");
        assert!(request.format().is_ok());
    }
}
