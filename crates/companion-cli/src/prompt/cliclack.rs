use std::io::{self, Write};
use std::sync::OnceLock;

use anyhow::Result;
use bat::WrappingMode;
use cliclack::{input, spinner};
use companion::models::display::{DisplayKind, DisplayMessage};
use console::style;
use regex::Regex;

use super::{Input, InputType, Prompt, Theme};

pub struct CliclackPrompt {
    spinner: cliclack::ProgressBar,
    busy: bool,
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: spinner(),
            busy: false,
            input_mode: InputMode::Singleline,
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

impl Default for CliclackPrompt {
    fn default() -> Self {
        Self::new()
    }
}

/// A piece of a model answer, either prose or a fenced code block
#[derive(Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Code { language: &'a str, code: &'a str },
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```([\w+-]*)[^\n]*\n(.*?)```").expect("code fence pattern is valid")
    })
}

/// Split markdown into prose and fenced code blocks, in order.
/// An unterminated fence stays part of the surrounding prose.
pub fn split_fences(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for captures in fence_regex().captures_iter(text) {
        let Some(fence) = captures.get(0) else {
            continue;
        };
        push_text(&mut segments, &text[last..fence.start()]);
        segments.push(Segment::Code {
            language: captures.get(1).map_or("", |m| m.as_str()),
            code: captures
                .get(2)
                .map_or("", |m| m.as_str())
                .trim_end_matches('\n'),
        });
        last = fence.end();
    }
    push_text(&mut segments, &text[last..]);

    segments
}

fn push_text<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.trim().is_empty() {
        segments.push(Segment::Text(text.trim_matches('\n')));
    }
}

/// Syntax name for a fence tag. Untagged blocks are the generated Python.
pub fn bat_language(tag: &str) -> &str {
    match tag.to_ascii_lowercase().as_str() {
        "" | "python" | "python3" | "py" => "Python",
        _ => tag,
    }
}

fn print_tool_request(content: &str, theme: &str, tool_name: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(
            bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Request: {}", tool_name)),
        )
        .theme(theme)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_tool_response(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name("Tool Response:"))
        .theme(theme)
        .language("Markdown")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_code(code: &str, theme: &str, language: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(code.as_bytes()).name(language))
        .theme(theme)
        .language(language)
        .grid(true)
        .header(true)
        .line_numbers(true)
        .print();
    if printed.is_err() {
        println!("{}", code);
    }
}

fn print(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_answer(content: &str, theme: &str) {
    for segment in split_fences(content) {
        match segment {
            Segment::Text(text) => print(text, theme),
            Segment::Code { language, code } => print_code(code, theme, bat_language(language)),
        }
        print_newline();
    }
}

fn print_newline() {
    println!();
}

impl Prompt for CliclackPrompt {
    fn render(&mut self, message: &DisplayMessage) {
        let theme = self.theme_name();

        match message.kind {
            DisplayKind::Thought => {
                println!("{} {}", style("Thought:").cyan().bold(), message.content);
            }
            DisplayKind::ToolCall => {
                println!("{}", style(&message.content).yellow());
                if let (Some(name), Some(args)) = (&message.tool_name, &message.tool_args) {
                    let pretty =
                        serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
                    print_tool_request(&pretty, theme, name);
                }
            }
            DisplayKind::ToolObservation => print_tool_response(&message.content, theme),
            DisplayKind::Final => print_answer(&message.content, theme),
            DisplayKind::Error => println!("{}", style(&message.content).red().bold()),
        }

        print_newline();
        // A closed stdout is not worth failing the session over
        let _ = io::stdout().flush();
    }

    fn notice(&mut self, text: &str) {
        println!("{}", style(text).dim());
    }

    fn show_busy(&mut self) {
        if !self.busy {
            self.spinner = spinner();
            self.spinner.start("awaiting reply");
            self.busy = true;
        }
    }

    fn hide_busy(&mut self) {
        if self.busy {
            self.spinner.stop("");
            self.busy = false;
        }
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("DuDraw Companion:         [Help: /?]").placeholder("");
        match self.input_mode {
            InputMode::Multiline => input = input.multiline(),
            InputMode::Singleline => (),
        }
        let mut message_text: String = input.interact()?;
        message_text = message_text.trim().to_string();

        if message_text.is_empty() {
            Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/exit")
            || message_text.eq_ignore_ascii_case("/quit")
        {
            Ok(Input {
                input_type: InputType::Exit,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/m") {
            self.input_mode = InputMode::Multiline;
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/s") {
            self.input_mode = InputMode::Singleline;
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/?") {
            println!("Commands:");
            println!("/exit - Exit the session");
            println!("/quit - Exit the session");
            println!("/m - Switch to multiline input mode");
            println!("/s - Switch to singleline input mode");
            println!("/t - Toggle Light/Dark theme");
            println!("/? - Display this help message");
            println!("Ctrl+C - Interrupt the current request");
            self.get_input()
        } else {
            Ok(Input {
                input_type: InputType::Message,
                content: Some(message_text),
            })
        }
    }

    fn close(&self) {
        // No cleanup required
    }
}
