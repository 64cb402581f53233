use crate::explorer::store::StoreClient;

const HISTORY_LIMIT: usize = 100;

/// Free-form command console.
#[derive(Debug)]
pub struct CommandState {
    pub input_buffer: String,
    pub last_result: Option<String>,
    pub history: Vec<String>,
}

impl CommandState {
    pub fn new() -> Self {
        CommandState {
            input_buffer: String::new(),
            last_result: None,
            history: Vec::new(),
        }
    }

    /// Runs the buffered command and stores the rendered reply (or error) in `last_result`.
    pub async fn execute_command(&mut self, store: &dyn StoreClient) {
        if self.input_buffer.trim().is_empty() {
            self.last_result = Some("Command is empty.".to_string());
            return;
        }

        let args = match split_args(&self.input_buffer) {
            Some(args) => args,
            None => {
                self.last_result = Some("Error: unbalanced quotes".to_string());
                return;
            }
        };

        self.remember(self.input_buffer.trim().to_string());
        log::debug!("executing console command {:?}", args.first());
        self.last_result = Some(match store.execute(&args).await {
            Ok(reply) => reply,
            Err(e) => format!("Error: {}", e),
        });
    }

    fn remember(&mut self, line: String) {
        if self.history.last() == Some(&line) {
            return;
        }
        self.history.push(line);
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }
}

impl Default for CommandState {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits on whitespace, keeping double-quoted runs together. `None` on an open quote.
pub(crate) fn split_args(line: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return None;
    }
    if has_token {
        args.push(current);
    }
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::testing::MemoryStore;

    #[test]
    fn split_args_handles_quotes() {
        assert_eq!(
            split_args(r#"SET greeting "hello world""#),
            Some(vec!["SET".to_string(), "greeting".into(), "hello world".into()])
        );
        assert_eq!(split_args(r#"SET k """#), Some(vec!["SET".into(), "k".into(), String::new()]));
        assert_eq!(split_args(r#"GET "open"#), None);
    }

    #[tokio::test]
    async fn execute_records_reply_and_history() {
        let store = MemoryStore::new();
        store.put_string("a", "1");
        let mut console = CommandState::new();

        console.input_buffer = "dbsize".into();
        console.execute_command(&store).await;
        assert_eq!(console.last_result.as_deref(), Some("(integer) 1"));

        console.input_buffer = "bogus".into();
        console.execute_command(&store).await;
        assert!(console.last_result.as_deref().unwrap_or("").starts_with("Error:"));
        assert_eq!(console.history, vec!["dbsize", "bogus"]);
    }

    #[tokio::test]
    async fn empty_command_is_not_sent() {
        let store = MemoryStore::new();
        let mut console = CommandState::new();
        console.input_buffer = "   ".into();
        console.execute_command(&store).await;
        assert_eq!(console.last_result.as_deref(), Some("Command is empty."));
        assert_eq!(store.calls("execute"), 0);
    }
}
