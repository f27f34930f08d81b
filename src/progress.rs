//! Progress indicators for the cirrus CLI.

use indicatif::{ProgressBar, ProgressStyle};

/// Bar counting plan steps
pub fn step_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("=>-"));
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb
}

/// Bar that draws nothing, for `--quiet`
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}
