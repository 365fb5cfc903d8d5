//! Opens the saved figure in an external image viewer.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Environment variable naming the viewer program.
pub const VIEWER_ENV: &str = "PAIRED_STATS_VIEWER";

/// A viewer program and the arguments placed before the image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl Viewer {
    fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The platform's default opener.
    pub fn platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("open")
        } else if cfg!(windows) {
            Self {
                program: "cmd".into(),
                args: vec!["/C".into(), "start".into(), "".into()],
            }
        } else {
            Self::new("xdg-open")
        }
    }

    fn command(&self, image: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(image);
        command
    }
}

/// Resolves the viewer: `PAIRED_STATS_VIEWER` if set and non-empty, otherwise
/// the platform opener.
pub fn find_viewer() -> Viewer {
    resolve(std::env::var_os(VIEWER_ENV))
}

fn resolve(from_env: Option<OsString>) -> Viewer {
    from_env
        .filter(|program| !program.is_empty())
        .map_or_else(Viewer::platform, Viewer::new)
}

/// Opens `image` and waits for the viewer to exit.
///
/// Failures are logged and otherwise ignored. Returns whether the viewer
/// reported success.
pub fn show(image: &Path) -> bool {
    show_with(&find_viewer(), image)
}

/// Same as [`show`] with an explicit viewer.
pub fn show_with(viewer: &Viewer, image: &Path) -> bool {
    debug!(viewer = ?viewer.program, image = %image.display(), "opening figure");
    match viewer.command(image).status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(viewer = ?viewer.program, %status, "image viewer exited with an error");
            false
        }
        Err(e) => {
            warn!(viewer = ?viewer.program, error = %e, "could not launch image viewer");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_env_viewer_wins() {
        let viewer = resolve(Some("feh".into()));
        assert_eq!(viewer, Viewer::new("feh"));
    }

    #[test]
    fn test_empty_env_falls_back_to_platform() {
        assert_eq!(resolve(Some(OsString::new())), Viewer::platform());
        assert_eq!(resolve(None), Viewer::platform());
    }

    #[test]
    fn test_missing_viewer_is_tolerated() {
        let viewer = Viewer::new("paired-stats-no-such-viewer");
        assert!(!show_with(&viewer, Path::new("figure.png")));
    }

    #[cfg(unix)]
    #[test]
    fn test_viewer_exit_status() {
        assert!(show_with(&Viewer::new("true"), Path::new("figure.png")));
        assert!(!show_with(&Viewer::new("false"), Path::new("figure.png")));
    }
}
