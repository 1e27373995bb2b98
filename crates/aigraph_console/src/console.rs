// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-oriented command console over a [`GraphEditor`].

use crate::config::ConsoleConfig;
use aigraph_graph::{EditorError, GraphEditor, NodeId};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

const HELP: &[&str] = &[
    "help                                  show this list",
    "types                                 list node types",
    "list                                  list nodes and their inputs",
    "add <type> [x y]                      add a node",
    "delete <id>                           delete a node",
    "move <id> <x> <y>                     move a node",
    "link <out> <slot> <in> <slot>         link an output to an input",
    "unlink <out> <slot> <in> <slot>       remove a link",
    "set <id> <slot> <value>               set an input constant",
    "prop <id> <name> <value>              set a property",
    "order                                 print evaluation order",
    "compile [path]                        compile, optionally writing the blob",
    "run                                   compile and evaluate once",
    "save <path>                           save the graph",
    "load <path>                           load a graph",
    "catalog <path>                        switch node catalog",
    "history                               show recent commands",
    "quit                                  exit",
];

/// Error from a console command
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Unrecognized command word
    #[error("invalid command")]
    InvalidCommand,

    /// Wrong number of arguments
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Argument that should have been a number
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// Editor rejected the operation; already reported by the editor
    #[error(transparent)]
    Editor(#[from] EditorError),

    /// Writing compile output failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What the read loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read another command
    Continue,
    /// Stop reading
    Quit,
}

/// Console session state
pub struct Console {
    editor: GraphEditor,
    config: ConsoleConfig,
    history: VecDeque<String>,
}

impl Console {
    /// Create a console driving `editor`
    pub fn new(editor: GraphEditor, config: ConsoleConfig) -> Self {
        Self {
            editor,
            config,
            history: VecDeque::new(),
        }
    }

    /// The editing session
    pub fn editor(&self) -> &GraphEditor {
        &self.editor
    }

    /// Read and execute commands until `quit` or end of input
    pub fn run(&mut self, input: impl BufRead, mut prompt: impl Write) -> io::Result<()> {
        let mut lines = input.lines();
        loop {
            write!(prompt, "{}", self.config.prompt)?;
            prompt.flush()?;
            let Some(line) = lines.next().transpose()? else {
                break;
            };
            if self.execute(&line) == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Execute one command line
    pub fn execute(&mut self, line: &str) -> Flow {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Flow::Continue;
        };
        self.remember(line.trim());
        tracing::debug!("Command: {}", line.trim());

        match self.dispatch(command, args) {
            Ok(flow) => flow,
            // The editor prints its own failures
            Err(CommandError::Editor(_)) => Flow::Continue,
            Err(e) => {
                tracing::warn!("{command}: {e}");
                self.editor.print(format!("error: {e}"));
                Flow::Continue
            }
        }
    }

    fn dispatch(&mut self, command: &str, args: &[&str]) -> Result<Flow, CommandError> {
        match (command, args) {
            ("help", []) => {
                for line in HELP {
                    self.editor.print(line);
                }
            }
            ("types", []) => self.editor.list_types(),
            ("list", []) => self.editor.list_nodes(),
            ("add", [type_name]) => {
                self.editor.add_node(type_name, [0.0, 0.0])?;
            }
            ("add", [type_name, x, y]) => {
                let position = [number(x)?, number(y)?];
                self.editor.add_node(type_name, position)?;
            }
            ("add", _) => return Err(CommandError::Usage("add <type> [x y]")),
            ("delete", [id]) => self.editor.delete_node(node_id(id)?)?,
            ("delete", _) => return Err(CommandError::Usage("delete <id>")),
            ("move", [id, x, y]) => {
                let position = [number(x)?, number(y)?];
                self.editor.move_node(node_id(id)?, position)?;
            }
            ("move", _) => return Err(CommandError::Usage("move <id> <x> <y>")),
            ("link", [from, from_slot, to, to_slot]) => {
                self.editor.link(node_id(from)?, from_slot, node_id(to)?, to_slot)?;
            }
            ("link", _) => return Err(CommandError::Usage("link <out> <slot> <in> <slot>")),
            ("unlink", [from, from_slot, to, to_slot]) => {
                self.editor.unlink(node_id(from)?, from_slot, node_id(to)?, to_slot)?;
            }
            ("unlink", _) => return Err(CommandError::Usage("unlink <out> <slot> <in> <slot>")),
            ("set", [id, slot, value]) => {
                self.editor.set_constant(node_id(id)?, slot, number(value)?)?;
            }
            ("set", _) => return Err(CommandError::Usage("set <id> <slot> <value>")),
            ("prop", [id, name, value @ ..]) if !value.is_empty() => {
                self.editor.set_property(node_id(id)?, name, &value.join(" "))?;
            }
            ("prop", _) => return Err(CommandError::Usage("prop <id> <name> <value>")),
            ("order", []) => {
                self.editor.print_order()?;
            }
            ("compile", []) => {
                self.editor.compile()?;
            }
            ("compile", [path]) => {
                let blob = self.editor.compile()?;
                std::fs::write(path, blob.as_bytes())?;
                self.editor.print(format!("wrote {path}"));
            }
            ("compile", _) => return Err(CommandError::Usage("compile [path]")),
            ("run", []) => {
                self.editor.run()?;
            }
            ("save", [path]) => {
                let path = self.config.with_default_extension(path);
                self.editor.save(path)?;
            }
            ("save", _) => return Err(CommandError::Usage("save <path>")),
            ("load", [path]) => {
                let path = self.config.with_default_extension(path);
                self.editor.load(path)?;
            }
            ("load", _) => return Err(CommandError::Usage("load <path>")),
            ("catalog", [path]) => self.editor.load_catalog(path)?,
            ("catalog", _) => return Err(CommandError::Usage("catalog <path>")),
            ("history", []) => {
                let lines: Vec<String> = self
                    .history
                    .iter()
                    .enumerate()
                    .map(|(i, line)| format!("{i:>4}  {line}"))
                    .collect();
                for line in lines {
                    self.editor.print(line);
                }
            }
            ("quit" | "exit", []) => return Ok(Flow::Quit),
            ("help" | "types" | "list" | "order" | "run" | "history" | "quit" | "exit", _) => {
                return Err(CommandError::Usage("command takes no arguments"))
            }
            _ => return Err(CommandError::InvalidCommand),
        }
        Ok(Flow::Continue)
    }

    fn remember(&mut self, line: &str) {
        if self.config.history_limit == 0 {
            return;
        }
        if self.history.len() == self.config.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(line.to_string());
    }
}

fn number(text: &str) -> Result<f32, CommandError> {
    text.parse()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

fn node_id(text: &str) -> Result<NodeId, CommandError> {
    text.parse()
        .map(NodeId)
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigraph_graph::{Catalog, PropertyValue};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn console() -> (Console, Rc<RefCell<Vec<String>>>) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let editor = GraphEditor::new(Arc::new(Catalog::builtin()), move |line: &str| {
            sink.borrow_mut().push(line.to_string());
        });
        (Console::new(editor, ConsoleConfig::default()), lines)
    }

    fn last(lines: &Rc<RefCell<Vec<String>>>) -> String {
        lines.borrow().last().cloned().unwrap_or_default()
    }

    #[test]
    fn test_build_and_run_graph() {
        let (mut console, lines) = console();
        for line in [
            "add sum",
            "add play_anim 200 0",
            "set 0 in0 2",
            "set 0 1 0.5",
            "link 0 out 1 in",
            "prop 1 animation wave_hand",
            "run",
        ] {
            assert_eq!(console.execute(line), Flow::Continue);
        }
        assert_eq!(last(&lines), "trigger animation 1 (input 2.5)");

        let graph = console.editor().graph();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.node(NodeId(1)).unwrap().position, [200.0, 0.0]);
        assert_eq!(graph.node(NodeId(1)).unwrap().property(0), Some(&PropertyValue::Enum(1)));
    }

    #[test]
    fn test_invalid_command() {
        let (mut console, lines) = console();
        console.execute("frobnicate 1 2");
        assert_eq!(last(&lines), "error: invalid command");
    }

    #[test]
    fn test_wrong_argument_count() {
        let (mut console, lines) = console();
        console.execute("add");
        assert_eq!(last(&lines), "error: usage: add <type> [x y]");
        console.execute("link 0 out 1");
        assert_eq!(last(&lines), "error: usage: link <out> <slot> <in> <slot>");
        console.execute("list everything");
        assert!(last(&lines).starts_with("error: usage"));
        assert_eq!(console.editor().graph().node_count(), 0);
    }

    #[test]
    fn test_bad_numbers() {
        let (mut console, lines) = console();
        console.execute("add sum");
        console.execute("set zero in0 1");
        assert_eq!(last(&lines), "error: invalid number 'zero'");
        console.execute("set 0 in0 lots");
        assert_eq!(last(&lines), "error: invalid number 'lots'");
    }

    #[test]
    fn test_editor_errors_printed_once() {
        let (mut console, lines) = console();
        console.execute("add sum");
        console.execute("add sum");
        console.execute("link 0 out 1 in0");
        let before = lines.borrow().len();
        console.execute("link 1 out 0 in0");
        assert_eq!(lines.borrow().len(), before + 1);
        assert!(last(&lines).starts_with("error:"));
        assert_eq!(console.editor().graph().link_count(), 1);
    }

    #[test]
    fn test_save_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, _) = console();
        console.execute("add negate");
        let base = dir.path().join("scene");
        console.execute(&format!("save {}", base.display()));
        assert!(dir.path().join("scene.aig").exists());

        console.execute("delete 0");
        assert_eq!(console.editor().graph().node_count(), 0);
        console.execute(&format!("load {}", base.display()));
        assert_eq!(console.editor().graph().node_count(), 1);
    }

    #[test]
    fn test_compile_writes_blob() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, _) = console();
        console.execute("add sum");
        let path = dir.path().join("graph.bin");
        console.execute(&format!("compile {}", path.display()));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(u64::from_le_bytes(bytes[0..8].try_into().unwrap()), bytes.len() as u64);
    }

    #[test]
    fn test_history_is_bounded() {
        let (mut console, lines) = console();
        console.config.history_limit = 2;
        console.execute("types");
        console.execute("list");
        console.execute("order");
        console.execute("history");
        let lines = lines.borrow();
        let shown: Vec<&String> = lines.iter().rev().take(2).collect();
        assert_eq!(shown[0].trim(), "1  history");
        assert_eq!(shown[1].trim(), "0  order");
    }

    #[test]
    fn test_run_loop_stops_at_quit() {
        let (mut console, _) = console();
        let input = b"add sum\nquit\nadd sum\n";
        let mut prompt = Vec::new();
        console.run(&input[..], &mut prompt).unwrap();
        assert_eq!(console.editor().graph().node_count(), 1);
        assert_eq!(String::from_utf8(prompt).unwrap(), "> > ");
    }
}
