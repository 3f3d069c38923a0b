use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use vmflow_engine::{PipelineObserver, PollEvent, StageRecord, StageStatus};

/// デプロイの進捗表示
///
/// ステージの開始・終了を1行ずつ表示し、待機中はスピナーを出します。
pub struct DeployProgress {
    spinner: Mutex<Option<ProgressBar>>,
}

impl DeployProgress {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    fn set_message(&self, message: String) {
        let Ok(mut spinner) = self.spinner.lock() else {
            return;
        };
        let pb = spinner.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            let template = "{spinner:.green} [{elapsed_precise}] {msg}";
            if let Ok(style) = ProgressStyle::default_spinner().template(template) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        pb.set_message(message);
    }

    fn clear(&self) {
        if let Ok(mut spinner) = self.spinner.lock()
            && let Some(pb) = spinner.take()
        {
            pb.finish_and_clear();
        }
    }
}

impl PipelineObserver for DeployProgress {
    fn stage_started(&self, index: usize, total: usize, name: &str) {
        println!(
            "{} {}",
            format!("[{}/{}]", index + 1, total).dimmed(),
            name.cyan().bold()
        );
    }

    fn stage_finished(&self, name: &str, record: &StageRecord) {
        self.clear();
        let elapsed = format!("({:.1}s)", record.duration_ms as f64 / 1000.0).dimmed();
        match &record.status {
            StageStatus::Succeeded => println!("  {} {} {}", "✓".green(), name, elapsed),
            StageStatus::Recovered(error) => {
                println!("  {} {} {}", "⚠".yellow(), name, elapsed);
                println!("    {}", error.yellow());
            }
            StageStatus::Failed(error) => {
                println!("  {} {} {}", "✗".red(), name, elapsed);
                println!("    {}", error.red());
            }
        }
        for warning in &record.warnings {
            println!("    {} {}", "⚠".yellow(), warning.yellow());
        }
        for note in &record.notes {
            println!("    {}", note.dimmed());
        }
    }

    fn poll_event(&self, event: PollEvent<'_>) {
        let message = match event {
            PollEvent::Settling { probe, duration } => {
                format!("{probe}: 初回確認まで {}秒 待機中", duration.as_secs())
            }
            PollEvent::Attempt {
                probe,
                attempt,
                max_attempts,
            } => format!("{probe}: 確認中 ({attempt}/{max_attempts})"),
            PollEvent::Waiting {
                probe,
                attempt,
                next_in,
            } => format!(
                "{probe}: 未完了 ({attempt}回目)、{}秒後に再確認",
                next_in.as_secs()
            ),
            PollEvent::Elapsed { elapsed, total } => {
                format!("初回起動を待機中 {}/{}秒", elapsed.as_secs(), total.as_secs())
            }
        };
        self.set_message(message);
    }
}
