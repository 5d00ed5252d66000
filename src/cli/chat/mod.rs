pub mod command;
pub mod composer;
pub mod conversation_state;
pub mod history;
pub mod prompt;

use std::io::{self, Write};
use std::process::ExitCode;

use command::Command;
use composer::Composer;
use conversation_state::{ConversationState, MessageId, PendingRequest};
use eyre::Result;
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use tracing::{debug, error};

use crate::agri_client::{AgriApi, ApiError, FALLBACK_STATUS};
use crate::cli::diagnose::{run_diagnosis, DiagnosisPanel};
use crate::cli::notice::Notice;
use crate::cli::render::{render_history, render_message};

/// Name shown on every reply from the service
pub const AGENT_LABEL: &str = "AgriGPT";

pub const SUGGESTIONS: [&str; 3] = [
    "What's the best time to plant tomatoes?",
    "How do I deal with aphids on my plants?",
    "Should I water my crops before rain?",
];

const WELCOME_TEXT: &str = "
Hi, I'm AgriGPT. Ask me about crops, pests, diseases or the weather,
or attach a photo of a plant and I'll take a look.

Things to try
  /try 1   Crop advice    What's the best time to plant tomatoes?
  /try 2   Pest control   How do I deal with aphids on my plants?
  /try 3   Weather tips   Should I water my crops before rain?

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
AgriGPT Chat

/attach <path>    Attach an image to your next message
/detach           Remove the attached image
/diagnose <path>  Diagnose a crop image without adding it to the chat
/history          Show your past questions and the replies they got
/try <number>     Send one of the suggested questions
/clear            Clear the conversation
/help             Show this help dialogue
/quit             Quit the application
";

/// What the caller should do after one line of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The line was rejected or its request failed
    Failed,
    Quit,
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    styled: bool,
    /// Send questions without an image to `/ask/text` instead of `/ask/chat`
    text_endpoint: bool,
    conversation_state: ConversationState,
    composer: Composer,
    diagnosis: DiagnosisPanel,
    api: Box<dyn AgriApi>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        api: Box<dyn AgriApi>,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            styled: true,
            text_endpoint: false,
            conversation_state: ConversationState::new(),
            composer: Composer::new(),
            diagnosis: DiagnosisPanel::new(),
            api,
        }
    }

    /// Toggle terminal styling of rendered messages.
    pub fn with_styling(mut self, styled: bool) -> Self {
        self.styled = styled;
        self
    }

    /// Route image-less questions to the text-only endpoint.
    pub fn with_text_endpoint(mut self, text_endpoint: bool) -> Self {
        self.text_endpoint = text_endpoint;
        self
    }

    #[cfg(test)]
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation_state
    }

    /// Stage an image for the next message. Rejections are reported as a notice.
    pub fn attach_image(&mut self, path: &str) -> Result<bool> {
        match self.composer.attach_path(path) {
            Ok(blob) => {
                let message = format!(
                    "Attached {} ({}). It will be sent with your next message.",
                    blob.file_name(),
                    blob.display_size()
                );
                Notice::Info.write(self.output.as_mut(), &message)?;
                Ok(true)
            }
            Err(e) => {
                Notice::Error.write(self.output.as_mut(), &e.to_string())?;
                Ok(false)
            }
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        if self.interactive {
            self.print_welcome()?;
        }

        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            let flow = self.handle_input(&input).await?;
            return Ok(match flow {
                Flow::Failed => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            });
        }

        if self.interactive {
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(self.composer.staged().map(|blob| blob.file_name()));
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    match self.handle_input(&line).await {
                        Ok(Flow::Quit) => break,
                        Ok(_) => {}
                        Err(e) => writeln!(self.output, "Error: {}", e)?,
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn handle_input(&mut self, input: &str) -> Result<Flow> {
        let command = Command::parse(input);
        debug!("Handling {:?}", command);

        match command {
            Command::Prompt(text) => return self.process_chat_input(&text).await,
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            Command::Clear => {
                self.conversation_state.clear_conversation();
                Notice::Success.write(self.output.as_mut(), "Chat cleared")?;
            }
            Command::History => {
                let entries = history::history(self.conversation_state.messages());
                writeln!(self.output, "{}", render_history(&entries, self.styled))?;
            }
            Command::Attach(path) => {
                if !self.attach_image(&path)? {
                    return Ok(Flow::Failed);
                }
            }
            Command::Detach => {
                let message = if self.composer.detach() {
                    "Attachment removed"
                } else {
                    "No image attached"
                };
                Notice::Info.write(self.output.as_mut(), message)?;
            }
            Command::Diagnose(path) => {
                let diagnosed = run_diagnosis(
                    self.output.as_mut(),
                    &mut self.diagnosis,
                    self.api.as_ref(),
                    &path,
                    self.styled,
                )
                .await?;
                if !diagnosed {
                    return Ok(Flow::Failed);
                }
            }
            Command::Suggestion(n) => match n.checked_sub(1).and_then(|i| SUGGESTIONS.get(i).copied()) {
                Some(text) => return self.process_chat_input(text).await,
                None => {
                    let message = format!("There is no suggestion {}. Pick 1 to {}.", n, SUGGESTIONS.len());
                    Notice::Error.write(self.output.as_mut(), &message)?;
                    return Ok(Flow::Failed);
                }
            },
            Command::MissingArgument(usage) => {
                Notice::Error.write(self.output.as_mut(), &format!("Usage: {}", usage))?;
                return Ok(Flow::Failed);
            }
            Command::Unknown(name) => {
                let message = format!("Unknown command {}. Type /help to see what's available.", name);
                Notice::Error.write(self.output.as_mut(), &message)?;
                return Ok(Flow::Failed);
            }
        }

        Ok(Flow::Continue)
    }

    async fn process_chat_input(&mut self, text: &str) -> Result<Flow> {
        if self.conversation_state.is_loading() {
            Notice::Error.write(self.output.as_mut(), "Please wait for the current response")?;
            return Ok(Flow::Failed);
        }

        let submission = match self.composer.submit(text) {
            Ok(submission) => submission,
            Err(e) => {
                Notice::Error.write(self.output.as_mut(), &e.to_string())?;
                return Ok(Flow::Failed);
            }
        };

        let pending = self.conversation_state.begin_request(&submission);
        if let Err(e) = self.show_pending(&pending) {
            pending.fail(&mut self.conversation_state, &ApiError::new(FALLBACK_STATUS, e.to_string()));
            return Err(e.into());
        }

        let outcome = match submission.image() {
            None if self.text_endpoint => self.api.ask_text(submission.text()).await,
            image => self.api.ask_chat(submission.text(), image).await,
        };

        match outcome {
            Ok(response) => {
                let reply = pending.succeed(&mut self.conversation_state, &response, AGENT_LABEL);
                self.print_message(reply)?;
                Notice::Success.write(self.output.as_mut(), "Response received")?;
                Ok(Flow::Continue)
            }
            Err(err) => {
                error!("Chat error: {}", err);
                pending.fail(&mut self.conversation_state, &err);
                let message = self.conversation_state.last_error().unwrap_or_default().to_string();
                Notice::Error.write(self.output.as_mut(), &message)?;
                Ok(Flow::Failed)
            }
        }
    }

    /// Echo the optimistic user messages and the waiting line.
    fn show_pending(&mut self, pending: &PendingRequest) -> io::Result<()> {
        for &id in pending.user_messages() {
            self.print_message(id)?;
        }
        writeln!(self.output, "{} is thinking...", AGENT_LABEL)?;
        self.output.flush()
    }

    fn print_message(&mut self, id: MessageId) -> io::Result<()> {
        if let Some(message) = self.conversation_state.messages().iter().find(|m| m.id == id) {
            let rendered = render_message(message, &self.conversation_state, self.styled);
            writeln!(self.output, "\n{}\n", rendered)?;
        }
        Ok(())
    }
}
