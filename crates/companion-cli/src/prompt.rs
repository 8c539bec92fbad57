use anyhow::Result;
use companion::models::display::DisplayMessage;

pub mod cliclack;

pub trait Prompt {
    fn render(&mut self, message: &DisplayMessage);
    /// Print a line that is not part of an agent run
    fn notice(&mut self, text: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn companion_ready(&self) {
        println!("\n");
        println!(
            "DuDraw Code Companion is ready! Describe the drawing, animation or game you want."
        );
        println!("\n");
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
