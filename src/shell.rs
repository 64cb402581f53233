//! Line-oriented driver over the explorer controllers.

use crate::command::{split_args, CommandState};
use crate::explorer::editors::{ElementRow, ElementStatus, LoadStatus, StringStatus};
use crate::explorer::store::{HashElement, KeyType, ListPosition, NewKeyValue};
use crate::explorer::value_format::{escape_inline, format_json_pretty};
use crate::explorer::{Explorer, KeyStatus, KeysStatus, StoreError, TypeEditor};
use std::fmt::Write;

pub const HELP: &str = "\
keys [TYPE] [PATTERN]   filter the key list (TYPE: all|string|hash|list|set)
refresh | more          rescan / load one more page of keys
find QUERY              fuzzy search over loaded keys
open KEY | close        show / hide a key
del KEY                 delete a key
show                    print the open key
save VALUE              overwrite the open string
edit ID VALUE           update an element (set: ID is the old member)
add ARGS                hash: FIELD VALUE, list: head|tail VALUE, set: MEMBER
rm ID                   delete an element
filter [CRITERION]      element filter (hash/set: glob, list: index)
next                    load more elements
new TYPE KEY VALUES..   create a key (hash values as field=value)
:COMMAND                run a raw command
help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Keys {
        key_type: Option<KeyType>,
        pattern: String,
    },
    Refresh,
    More,
    Find(String),
    Open(String),
    Close,
    Delete(String),
    Show,
    Save(String),
    Edit {
        id: String,
        value: String,
    },
    Add(Vec<String>),
    Remove(String),
    Filter(String),
    Next,
    New {
        name: String,
        value: NewKeyValue,
    },
    Console(String),
    Help,
    Quit,
}

fn parse_type(word: &str) -> Result<Option<KeyType>, String> {
    if word.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    KeyType::parse(word)
        .map(Some)
        .ok_or_else(|| format!("unknown type '{}'", word))
}

fn parse_new(key_type: &str, name: &str, values: &[String]) -> Result<NewKeyValue, String> {
    if name.is_empty() {
        return Err("missing key name".to_string());
    }
    let key_type = parse_type(key_type)?.ok_or("a new key needs a concrete type")?;
    Ok(match key_type {
        KeyType::String => NewKeyValue::String(values.join(" ")),
        KeyType::Hash => {
            let fields = values
                .iter()
                .map(|pair| {
                    pair.split_once('=')
                        .map(|(f, v)| HashElement::new(f, v))
                        .ok_or_else(|| format!("expected field=value, got '{}'", pair))
                })
                .collect::<Result<Vec<_>, String>>()?;
            NewKeyValue::Hash(fields)
        }
        KeyType::List => NewKeyValue::List(values.to_vec()),
        KeyType::Set => NewKeyValue::Set(values.to_vec()),
    })
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if let Some(raw) = line.strip_prefix(':') {
        return Ok(Some(ShellCommand::Console(raw.trim().to_string())));
    }
    let words = split_args(line).ok_or("unbalanced quotes")?;
    let (head, rest) = match words.split_first() {
        Some(split) => split,
        None => return Ok(None),
    };
    let rest_joined = || rest.join(" ");
    let need = |n: usize| -> Result<(), String> {
        if rest.len() < n {
            Err(format!("'{}' needs {} argument(s); try 'help'", head, n))
        } else {
            Ok(())
        }
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "keys" => {
            let (key_type, pattern) = match rest {
                [] => (None, String::new()),
                [one] => match parse_type(one) {
                    Ok(key_type) => (key_type, String::new()),
                    Err(_) => (None, one.clone()),
                },
                [t, p, ..] => (parse_type(t)?, p.clone()),
            };
            ShellCommand::Keys { key_type, pattern }
        }
        "refresh" => ShellCommand::Refresh,
        "more" => ShellCommand::More,
        "find" => ShellCommand::Find(rest_joined()),
        "open" => {
            need(1)?;
            ShellCommand::Open(rest[0].clone())
        }
        "close" => ShellCommand::Close,
        "del" => {
            need(1)?;
            ShellCommand::Delete(rest[0].clone())
        }
        "show" => ShellCommand::Show,
        "save" => ShellCommand::Save(rest_joined()),
        "edit" => {
            need(2)?;
            ShellCommand::Edit {
                id: rest[0].clone(),
                value: rest[1..].join(" "),
            }
        }
        "add" => {
            need(1)?;
            ShellCommand::Add(rest.to_vec())
        }
        "rm" => {
            need(1)?;
            ShellCommand::Remove(rest[0].clone())
        }
        "filter" => ShellCommand::Filter(rest_joined()),
        "next" => ShellCommand::Next,
        "new" => {
            need(2)?;
            ShellCommand::New {
                name: rest[1].clone(),
                value: parse_new(&rest[0], &rest[1], &rest[2..])?,
            }
        }
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{}'; try 'help'", other)),
    };
    Ok(Some(command))
}

pub enum Outcome {
    Print(String),
    Quit,
}

pub struct Shell {
    explorer: Explorer,
    console: CommandState,
}

impl Shell {
    pub fn new(explorer: Explorer) -> Self {
        Self {
            explorer,
            console: CommandState::new(),
        }
    }

    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    pub async fn handle(&mut self, command: ShellCommand) -> Outcome {
        match self.dispatch(command).await {
            Ok(Some(out)) => Outcome::Print(out),
            Ok(None) => Outcome::Quit,
            Err(e) => {
                self.explorer.reconcile(&e);
                Outcome::Print(format!("Error: {}", e))
            }
        }
    }

    async fn dispatch(&mut self, command: ShellCommand) -> Result<Option<String>, StoreError> {
        let keys = self.explorer.keys();
        let out = match command {
            ShellCommand::Keys { key_type, pattern } => {
                keys.filter(key_type, &pattern).await?;
                self.render_keys()
            }
            ShellCommand::Refresh => {
                keys.refresh().await?;
                self.render_keys()
            }
            ShellCommand::More => {
                keys.load_more().await?;
                self.render_keys()
            }
            ShellCommand::Find(query) => {
                let found = keys.search(&query);
                if found.is_empty() {
                    "no loaded key matches".to_string()
                } else {
                    found
                        .iter()
                        .map(|k| format!("  {} ({})", k.name, k.key_type))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            ShellCommand::Open(name) => {
                self.explorer.open_key(&name).await?;
                self.render_details()
            }
            ShellCommand::Close => {
                self.explorer.close_details();
                "closed".to_string()
            }
            ShellCommand::Delete(name) => {
                self.explorer.delete_key(&name).await?;
                format!("deleted '{}'", name)
            }
            ShellCommand::Show => self.render_details(),
            ShellCommand::Save(value) => {
                let editor = self.open_editor()?;
                let string = editor.as_string().ok_or_else(|| wrong_editor("save", &editor))?;
                string.save(&value).await?;
                self.render_details()
            }
            ShellCommand::Edit { id, value } => {
                let editor = self.open_editor()?;
                match editor.as_ref() {
                    TypeEditor::Hash(hash) => hash.update_element(&id, &value).await?,
                    TypeEditor::List(list) => list.update_element(parse_index(&id)?, &value).await?,
                    TypeEditor::Set(set) => set.update_element(&id, &value).await?,
                    TypeEditor::String(string) => string.save(&value).await?,
                }
                self.render_details()
            }
            ShellCommand::Add(args) => {
                let editor = self.open_editor()?;
                let note = match (editor.as_ref(), args.as_slice()) {
                    (TypeEditor::Hash(hash), [field, value @ ..]) => {
                        match hash.add_element(field, &value.join(" ")).await? {
                            Some(true) => "field added",
                            Some(false) => "field updated",
                            None => "discarded",
                        }
                    }
                    (TypeEditor::List(list), [position, value @ ..]) => {
                        let position = match position.to_ascii_lowercase().as_str() {
                            "head" => ListPosition::Head,
                            "tail" => ListPosition::Tail,
                            other => {
                                return Err(StoreError::InvalidInput(format!(
                                    "position must be head or tail, got '{}'",
                                    other
                                )))
                            }
                        };
                        list.add_element(position, &value.join(" ")).await?;
                        "element pushed"
                    }
                    (TypeEditor::Set(set), members) => {
                        match set.add_element(&members.join(" ")).await? {
                            Some(true) => "member added",
                            Some(false) => "member already present",
                            None => "discarded",
                        }
                    }
                    _ => return Err(wrong_editor("add", &editor)),
                };
                format!("{}\n{}", note, self.render_details())
            }
            ShellCommand::Remove(id) => {
                let editor = self.open_editor()?;
                match editor.as_ref() {
                    TypeEditor::Hash(hash) => hash.delete_element(&id).await?,
                    TypeEditor::List(list) => list.delete_element(parse_index(&id)?).await?,
                    TypeEditor::Set(set) => set.delete_element(&id).await?,
                    TypeEditor::String(_) => return Err(wrong_editor("rm", &editor)),
                }
                self.render_details()
            }
            ShellCommand::Filter(criterion) => {
                let editor = self.open_editor()?;
                match editor.as_ref() {
                    TypeEditor::Hash(hash) => hash.filter(&criterion).await?,
                    TypeEditor::Set(set) => set.filter(&criterion).await?,
                    TypeEditor::List(list) => {
                        let index = if criterion.is_empty() {
                            None
                        } else {
                            Some(parse_index(&criterion)?)
                        };
                        list.filter(index).await?
                    }
                    TypeEditor::String(_) => return Err(wrong_editor("filter", &editor)),
                }
                self.render_details()
            }
            ShellCommand::Next => {
                let editor = self.open_editor()?;
                match editor.as_ref() {
                    TypeEditor::Hash(hash) => hash.load_more().await?,
                    TypeEditor::List(list) => list.load_more().await?,
                    TypeEditor::Set(set) => set.load_more().await?,
                    TypeEditor::String(_) => return Err(wrong_editor("next", &editor)),
                }
                self.render_details()
            }
            ShellCommand::New { name, value } => {
                self.explorer.create_key(&name, &value).await?;
                format!("created '{}'\n{}", name, self.render_details())
            }
            ShellCommand::Console(raw) => {
                let store = self.explorer.store();
                self.console.input_buffer = raw;
                self.console.execute_command(store.as_ref()).await;
                self.console.last_result.clone().unwrap_or_default()
            }
            ShellCommand::Help => HELP.to_string(),
            ShellCommand::Quit => return Ok(None),
        };
        Ok(Some(out))
    }

    fn open_editor(&self) -> Result<std::sync::Arc<TypeEditor>, StoreError> {
        self.explorer
            .details()
            .current()
            .ok_or_else(|| StoreError::InvalidInput("no key is open".to_string()))
    }

    pub fn render_keys(&self) -> String {
        let view = self.explorer.keys().view();
        let mut out = String::new();
        for state in &view.keys {
            let marker = match state.status {
                KeyStatus::Selected => '>',
                KeyStatus::Deleting => '-',
                KeyStatus::Idle => ' ',
            };
            writeln!(out, "{} {} ({})", marker, state.key.name, state.key.key_type).ok();
        }
        let status = match &view.status {
            KeysStatus::LoadingKeys => "loading keys".to_string(),
            KeysStatus::Loaded => "loaded".to_string(),
            KeysStatus::Filtering => "filtering".to_string(),
            KeysStatus::Refreshing => "refreshing".to_string(),
            KeysStatus::Error(message) => format!("error: {}", message),
        };
        write!(
            out,
            "[{}] {} shown of {}{}",
            status,
            view.keys.len(),
            view.total.map_or("?".to_string(), |t| t.to_string()),
            if view.has_more { ", 'more' for next page" } else { "" }
        )
        .ok();
        out
    }

    pub fn render_details(&self) -> String {
        let Some(editor) = self.explorer.details().current() else {
            return "no key is open".to_string();
        };
        let mut out = format!("{} ({})\n", editor.key(), editor.key_type());
        match editor.as_ref() {
            TypeEditor::String(string) => {
                let view = string.view();
                if view.status == StringStatus::Loading {
                    out.push_str("loading...");
                } else {
                    out.push_str(&format_json_pretty(&view.value));
                }
                if let Some(error) = view.error {
                    write!(out, "\n(last error: {})", error).ok();
                }
            }
            TypeEditor::Hash(hash) => {
                let view = hash.view();
                render_rows(&mut out, &view.elements, |e| {
                    format!("{}: {}", e.field, escape_inline(&e.value))
                });
                render_footer(&mut out, &view.load, view.elements.len(), view.total, view.has_more);
            }
            TypeEditor::List(list) => {
                let view = list.view();
                render_rows(&mut out, &view.elements, |e| {
                    format!("[{}] {}", e.index, escape_inline(&e.value))
                });
                render_footer(&mut out, &view.load, view.elements.len(), view.total, view.has_more);
            }
            TypeEditor::Set(set) => {
                let view = set.view();
                render_rows(&mut out, &view.elements, |e| escape_inline(&e.value));
                render_footer(&mut out, &view.load, view.elements.len(), view.total, view.has_more);
            }
        }
        out
    }
}

fn render_rows<T>(out: &mut String, rows: &[ElementRow<T>], line: impl Fn(&T) -> String) {
    for row in rows {
        let marker = match row.status {
            ElementStatus::Idle => "  ",
            ElementStatus::Editing => "* ",
            ElementStatus::Updating => "~ ",
            ElementStatus::Deleting => "- ",
        };
        writeln!(out, "{}{}", marker, line(&row.element)).ok();
    }
}

fn render_footer(
    out: &mut String,
    load: &LoadStatus,
    shown: usize,
    total: Option<u64>,
    has_more: bool,
) {
    let status = match load {
        LoadStatus::Loading => "loading".to_string(),
        LoadStatus::Loaded => "loaded".to_string(),
        LoadStatus::Error(message) => format!("error: {}", message),
    };
    write!(
        out,
        "[{}] {} shown of {}{}",
        status,
        shown,
        total.map_or("?".to_string(), |t| t.to_string()),
        if has_more { ", 'next' for more" } else { "" }
    )
    .ok();
}

fn parse_index(raw: &str) -> Result<i64, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::InvalidInput(format!("'{}' is not a list index", raw)))
}

fn wrong_editor(action: &str, editor: &TypeEditor) -> StoreError {
    StoreError::InvalidInput(format!(
        "'{}' does not apply to {} key '{}'",
        action,
        editor.key_type(),
        editor.key()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorerSettings;
    use crate::explorer::testing::MemoryStore;
    use std::sync::Arc;

    fn shell(store: &Arc<MemoryStore>) -> Shell {
        Shell::new(Explorer::new(store.clone(), &ExplorerSettings::default()))
    }

    async fn run(shell: &mut Shell, line: &str) -> String {
        let command = parse_line(line).expect("parse").expect("command");
        match shell.handle(command).await {
            Outcome::Print(out) => out,
            Outcome::Quit => "<quit>".to_string(),
        }
    }

    #[test]
    fn parses_key_filters() {
        assert_eq!(
            parse_line("keys hash user:*").expect("parse"),
            Some(ShellCommand::Keys {
                key_type: Some(KeyType::Hash),
                pattern: "user:*".into()
            })
        );
        assert_eq!(
            parse_line("keys user:*").expect("parse"),
            Some(ShellCommand::Keys {
                key_type: None,
                pattern: "user:*".into()
            })
        );
        assert_eq!(parse_line("   ").expect("blank"), None);
        assert!(parse_line("keys zset x").is_err());
        assert!(parse_line("open").is_err());
    }

    #[test]
    fn parses_new_hash_pairs() {
        let parsed = parse_line("new hash user:1 name=ada \"bio=likes engines\"").expect("parse");
        assert_eq!(
            parsed,
            Some(ShellCommand::New {
                name: "user:1".into(),
                value: NewKeyValue::Hash(vec![
                    HashElement::new("name", "ada"),
                    HashElement::new("bio", "likes engines")
                ])
            })
        );
        assert!(parse_line("new hash user:1 broken").is_err());
        assert_eq!(
            parse_line(":GET a").expect("parse"),
            Some(ShellCommand::Console("GET a".into()))
        );
    }

    #[tokio::test]
    async fn browse_open_and_edit_session() {
        let store = Arc::new(MemoryStore::new());
        store.put_hash("user:1", &[("name", "ada")]);
        store.put_string("greeting", "hi");
        let mut shell = shell(&store);

        let listing = run(&mut shell, "keys").await;
        assert!(listing.contains("user:1 (hash)"));
        assert!(listing.contains("2 shown of 2"));

        let details = run(&mut shell, "open user:1").await;
        assert!(details.contains("name: ada"));

        let added = run(&mut shell, "add age 30").await;
        assert!(added.starts_with("field added"));
        assert_eq!(store.hash_field("user:1", "age"), Some("30".to_string()));

        let out = run(&mut shell, "save nope").await;
        assert!(out.starts_with("Error:"));

        assert_eq!(run(&mut shell, ":GET greeting").await, "\"hi\"");
        assert_eq!(run(&mut shell, "quit").await, "<quit>");
    }

    #[tokio::test]
    async fn vanished_key_is_dropped_from_listing() {
        let store = Arc::new(MemoryStore::new());
        store.put_set("tags", &["a"]);
        let mut shell = shell(&store);
        run(&mut shell, "keys").await;
        run(&mut shell, "open tags").await;
        store.fail_next(
            "add_set_member",
            StoreError::KeyNotFound("tags".into()),
        );

        let out = run(&mut shell, "add b").await;

        assert!(out.starts_with("Error:"));
        assert!(shell.explorer().keys().keys().is_empty());
        assert!(shell.explorer().details().current().is_none());
    }
}
