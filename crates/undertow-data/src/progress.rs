use indicatif::{ProgressBar, ProgressStyle};

/// A progress bar in the style used by every long-running stage.
pub fn progress_bar(label: &str, len: u64) -> ProgressBar {
    let template = format!("{label} {{spinner:.green}} [{{elapsed}}] [{{bar:50.white/white}}] {{pos}}/{{len}} ({{eta}})");
    let style = ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    ProgressBar::new(len).with_style(style)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_tracks_the_given_length() {
        let bar = progress_bar("Replaying", 7);
        bar.inc(3);

        assert_eq!(bar.length(), Some(7));
        assert_eq!(bar.position(), 3);
    }
}
