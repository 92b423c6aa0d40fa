use crate::platform;
use std::path::Path;

/// Print shell export lines for the prefix. With `--auto`, the syntax
/// follows `$SHELL`.
pub fn sh(auto: bool) {
    let shell = if auto {
        std::env::var("SHELL")
            .ok()
            .and_then(|s| {
                Path::new(&s)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "bash".to_string())
    } else {
        "bash".to_string()
    };

    let prefix = platform::detect_prefix();
    let bin_path = prefix.join("bin");
    let man_path = prefix.join("share/man");

    if shell == "fish" {
        println!("set -gx PATH {} $PATH", bin_path.display());
        println!("set -gx MANPATH {} $MANPATH", man_path.display());
    } else {
        println!("export PATH=\"{}:$PATH\"", bin_path.display());
        println!("export MANPATH=\"{}:$MANPATH\"", man_path.display());
    }
}
