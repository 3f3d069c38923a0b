use std::io::{self, Write};
use vmflow_engine::Prompt;

/// 端末から1行読み取るプロンプト
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&self, question: &str) -> io::Result<String> {
        print!("{question}");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input)
    }
}
