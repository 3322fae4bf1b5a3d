//! Console interaction
//!
//! Line-oriented prompts over any reader/writer pair.
//! A request line is `command [argument] [payload...]`.

use std::io::{BufRead, Write};

use super::Interaction;
use crate::protocol::{Request, Response, ResponseCode, User};

/// Prompt shown before user input
pub const PROMPT: &str = "$ ";

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) {
        // A closed terminal leaves nobody to report to
        let _ = writeln!(self.output, "{}", text);
        let _ = self.output.flush();
    }

    /// Read one trimmed line; `None` at end of input
    fn ask(&mut self, question: &str) -> Option<String> {
        if !question.is_empty() {
            self.say(question);
        }
        let _ = write!(self.output, "{}", PROMPT);
        let _ = self.output.flush();

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                tracing::warn!("Failed to read input: {}", e);
                None
            }
        }
    }

    fn ask_question(&mut self, question: &str) -> Option<bool> {
        let question = format!("{} (+/-):", question);
        loop {
            match self.ask(&question)?.as_str() {
                "+" => return Some(true),
                "-" => return Some(false),
                _ => self.say("The answer should be represented by the characters '+' or '-'!"),
            }
        }
    }

    fn ask_login(&mut self) -> Option<String> {
        loop {
            let login = self.ask("Enter your username:")?;
            if !login.is_empty() {
                return Some(login);
            }
            self.say("The name cannot be empty!");
        }
    }
}

/// Parse `command [argument] [payload...]`; a blank line is the no-op sentinel
pub fn parse_request(line: &str) -> Request {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let Some(command) = parts.next().filter(|c| !c.is_empty()) else {
        return Request::empty();
    };

    let mut request = Request::new(command);
    if let Some(argument) = parts.next() {
        request = request.with_argument(argument);
    }
    if let Some(payload) = parts.next().map(str::trim).filter(|p| !p.is_empty()) {
        request = request.with_payload(payload.as_bytes());
    }
    request
}

impl<R: BufRead, W: Write> Interaction for Console<R, W> {
    fn credentials(&mut self) -> Option<Request> {
        let has_account = self.ask_question("Do you already have an account?")?;
        let login = self.ask_login()?;
        let password = self.ask("Enter your password:")?;

        let command = if has_account { "login" } else { "register" };
        Some(Request::new(command).with_user(User::new(login, password)))
    }

    fn next_request(&mut self, last: Option<ResponseCode>, user: &User) -> Option<Request> {
        if matches!(last, Some(ResponseCode::Error) | Some(ResponseCode::InternalError)) {
            self.say("(type 'help' for the list of commands)");
        }
        let line = self.ask(&format!("[{}]", user.login))?;
        Some(parse_request(&line))
    }

    fn render(&mut self, response: &Response) {
        if !response.body.is_empty() {
            self.say(response.body.trim_end());
        }
    }

    fn notify(&mut self, message: &str) {
        self.say(message);
    }
}
