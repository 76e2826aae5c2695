use async_trait::async_trait;
use bsp_bridge::bsp::prompt::{PromptAction, PromptRequest, PromptService};
use std::io::{BufRead, IsTerminal, Write};

/// Asks on stderr and reads the answer from stdin.
///
/// When stdin is not a terminal (e.g. it carries BSP traffic) every prompt
/// is dismissed.
pub struct TerminalPrompt;

/// Match an answer against the offered actions: a 1-based index or a
/// case-insensitive prefix of the label.
fn parse_answer(input: &str, actions: &[PromptAction]) -> Option<PromptAction> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(index) = input.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| actions.get(i)).copied();
    }
    let input = input.to_lowercase();
    actions.iter().copied().find(|action| action.label().to_lowercase().starts_with(&input))
}

#[async_trait]
impl PromptService for TerminalPrompt {
    async fn ask(&self, request: PromptRequest) -> Option<PromptAction> {
        if !std::io::stdin().is_terminal() {
            tracing::warn!("{} (not asking: stdin is not a terminal)", request.topic);
            return None;
        }

        let result = tokio::task::spawn_blocking(move || -> std::io::Result<Option<PromptAction>> {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "{}", request.topic)?;
            for (i, action) in request.actions.iter().enumerate() {
                writeln!(stderr, "  [{}] {}", i + 1, action.label())?;
            }
            write!(stderr, "> ")?;
            stderr.flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(parse_answer(&line, &request.actions))
        })
        .await;

        match result {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!("Failed to read prompt answer: {e}");
                None
            }
            Err(e) => {
                tracing::warn!("Prompt task failed: {e}");
                None
            }
        }
    }
}
