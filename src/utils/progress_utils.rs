use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for batch execution
pub fn progress_bar(len: u64, message: String) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("#>-")
    );
    bar.set_message(message);

    bar
}
