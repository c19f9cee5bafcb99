use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Controls how step output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinners with checkmarks.
    Normal,
    /// No ANSI — plain println output (for piped/non-TTY or `--verbose`).
    Plain,
    /// Nothing at all (tests).
    Silent,
}

/// Numbered lifecycle steps with spinners and checkmarks.
pub struct StepProgress {
    multi: MultiProgress,
    total_steps: usize,
    current_step: usize,
    mode: OutputMode,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2713} {msg:.green}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2717} {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl StepProgress {
    pub fn new(total_steps: usize, mode: OutputMode) -> Self {
        let multi = match mode {
            OutputMode::Normal => MultiProgress::new(),
            OutputMode::Plain | OutputMode::Silent => {
                MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
            }
        };
        Self {
            multi,
            total_steps,
            current_step: 0,
            mode,
        }
    }

    fn next_prefix(&mut self) -> String {
        self.current_step += 1;
        format!("{}/{}", self.current_step, self.total_steps)
    }

    /// Run a fallible async task as a numbered step.
    ///
    /// Shows a spinner while running, then a checkmark or a cross depending
    /// on the result.
    pub async fn run<Fut, T, E>(&mut self, label: &str, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let prefix = self.next_prefix();

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] {label}");
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_prefix(prefix.clone());
        bar.set_message(label.to_string());
        if self.mode == OutputMode::Normal {
            bar.enable_steady_tick(std::time::Duration::from_millis(80));
        }

        let result = fut.await;

        match (&result, self.mode) {
            (Ok(_), OutputMode::Plain) => println!("[{prefix}] \u{2713} {label}"),
            (Err(_), OutputMode::Plain) => println!("[{prefix}] \u{2717} {label}"),
            _ => {}
        }

        let style = if result.is_ok() {
            done_style()
        } else {
            failed_style()
        };
        bar.set_style(style);
        bar.finish_with_message(label.to_string());

        result
    }

    /// Instant completion — nothing to do for this step.
    pub fn skip(&mut self, label: &str) {
        let prefix = self.next_prefix();

        match self.mode {
            OutputMode::Plain => println!("[{prefix}] \u{2713} {label}"),
            OutputMode::Silent => {}
            OutputMode::Normal => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(done_style());
                bar.set_prefix(prefix);
                bar.set_message(label.to_string());
                bar.finish();
            }
        }
    }

    /// Print a plain line (final messages).
    pub fn println(&self, text: &str) {
        match self.mode {
            OutputMode::Plain => println!("{text}"),
            OutputMode::Silent => {}
            OutputMode::Normal => {
                self.multi.println(text).ok();
            }
        }
    }

    pub fn steps_taken(&self) -> usize {
        self.current_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_run_and_skipped_steps() {
        let mut progress = StepProgress::new(3, OutputMode::Silent);
        let ok: Result<u32, ()> = progress.run("first", async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));
        progress.skip("second");
        let err: Result<(), &str> = progress.run("third", async { Err("boom") }).await;
        assert_eq!(err, Err("boom"));
        assert_eq!(progress.steps_taken(), 3);
    }
}
