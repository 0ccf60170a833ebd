use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{debug, warn};
use trinetra_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use trinetra_contracts::conversation::{
    EncodedFile, GeneratedArtifact, Message, Role, Transcript,
};
use trinetra_contracts::events::payload;
use trinetra_contracts::views::{ChatProfile, View};
use trinetra_engine::artifacts::write_artifact;
use trinetra_engine::encoder::encode_file;
use trinetra_engine::{
    CancelToken, ConversationSession, GenAiClient, GenAiError, SessionStore, CHAT_FALLBACK_REPLY,
};

pub const GENERATION_FAILED: &str = "Failed to generate image. Please try a different prompt.";
pub const EDIT_SOURCE_MISSING: &str = "Please upload an image first.";
pub const EDIT_INSTRUCTION_MISSING: &str = "Please provide an editing instruction.";
pub const EDIT_FAILED: &str = "Failed to edit image. Please try a different prompt.";
const SIGN_IN_REQUIRED: &str = "Sign in with /login to continue.";
const DATA_URI_PREVIEW_CHARS: usize = 48;

/// Everything the interactive loop reacts to, merged onto one channel.
pub enum AppEvent {
    Input(String),
    InputClosed,
    Completed { request_id: u64, outcome: Outcome },
}

pub enum Outcome {
    Reply(Result<String, GenAiError>),
    Image(Result<GeneratedArtifact, GenAiError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// A request owned by a screen. Dropping it (screen teardown, replacement) cancels it.
struct PendingRequest {
    id: u64,
    cancel: CancelToken,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Attachment {
    path: PathBuf,
    file: EncodedFile,
}

struct ChatScreen {
    profile: &'static ChatProfile,
    session: Arc<ConversationSession>,
    transcript: Transcript,
    attachment: Option<Attachment>,
    pending: Option<PendingRequest>,
}

impl ChatScreen {
    fn open(sessions: &SessionStore, profile: &'static ChatProfile) -> Self {
        Self {
            profile,
            session: sessions.get_or_create(profile.key, profile.system_instruction),
            transcript: Transcript::with_welcome(profile.welcome_message),
            attachment: None,
            pending: None,
        }
    }

    fn restart(&mut self, session: Arc<ConversationSession>) {
        self.session = session;
        self.transcript = Transcript::with_welcome(self.profile.welcome_message);
        self.attachment = None;
        self.pending = None;
    }
}

#[derive(Default)]
struct ImageScreen {
    source: Option<Attachment>,
    result: Option<GeneratedArtifact>,
    saved: Option<PathBuf>,
    error: Option<&'static str>,
    pending: Option<PendingRequest>,
}

impl ImageScreen {
    fn clear_result(&mut self) {
        self.result = None;
        self.saved = None;
        self.error = None;
    }

    /// One-line summary of the last request, shown again by `/views`.
    fn status(&self) -> Option<String> {
        if let Some(error) = self.error {
            return Some(error.to_string());
        }
        match (self.saved.as_ref(), self.result.as_ref()) {
            (Some(path), _) => Some(format!("Last image saved to {}", path.display())),
            (None, Some(_)) => Some("Last image was not saved.".to_string()),
            (None, None) => None,
        }
    }
}

enum Screen {
    Chat(ChatScreen),
    ImageGen(ImageScreen),
    ImageEdit(ImageScreen),
}

impl Screen {
    fn open(sessions: &SessionStore, view: View) -> Self {
        match view.chat_profile() {
            Some(profile) => Screen::Chat(ChatScreen::open(sessions, profile)),
            None if view == View::ImageEdit => Screen::ImageEdit(ImageScreen::default()),
            None => Screen::ImageGen(ImageScreen::default()),
        }
    }

    fn pending(&self) -> Option<&PendingRequest> {
        match self {
            Screen::Chat(chat) => chat.pending.as_ref(),
            Screen::ImageGen(image) | Screen::ImageEdit(image) => image.pending.as_ref(),
        }
    }

    fn take_pending(&mut self, request_id: u64) -> Option<PendingRequest> {
        let slot = match self {
            Screen::Chat(chat) => &mut chat.pending,
            Screen::ImageGen(image) | Screen::ImageEdit(image) => &mut image.pending,
        };
        if slot.as_ref().map(|pending| pending.id) == Some(request_id) {
            slot.take()
        } else {
            None
        }
    }
}

/// Spawns one worker thread per remote request and routes its outcome back to the loop.
struct Dispatcher {
    client: GenAiClient,
    tx: mpsc::Sender<AppEvent>,
    next_id: u64,
}

impl Dispatcher {
    fn spawn<F>(&mut self, job: F) -> PendingRequest
    where
        F: FnOnce(&GenAiClient, &CancelToken) -> Outcome + Send + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        let cancel = CancelToken::new();
        let client = self.client.clone();
        let token = cancel.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let outcome = job(&client, &token);
            if tx
                .send(AppEvent::Completed {
                    request_id: id,
                    outcome,
                })
                .is_err()
            {
                debug!(request_id = id, "app loop gone; dropping completion");
            }
        });
        PendingRequest { id, cancel }
    }
}

/// The interactive four-view application behind a mock sign-in.
pub struct App<W: Write> {
    dispatcher: Dispatcher,
    sessions: SessionStore,
    out_dir: PathBuf,
    output: W,
    signed_in: bool,
    view: View,
    screen: Option<Screen>,
    input_closed: bool,
}

impl<W: Write> App<W> {
    pub fn new(client: GenAiClient, out_dir: &Path, output: W, tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            sessions: client.session_store(),
            dispatcher: Dispatcher {
                client,
                tx,
                next_id: 0,
            },
            out_dir: out_dir.to_path_buf(),
            output,
            signed_in: false,
            view: View::default(),
            screen: None,
            input_closed: false,
        }
    }

    pub fn run(mut self, rx: &mpsc::Receiver<AppEvent>) -> Result<()> {
        self.render_intro()?;
        for event in rx.iter() {
            if self.handle_event(event)? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Result<Flow> {
        let flow = match event {
            AppEvent::Input(line) => self.handle_line(&line)?,
            AppEvent::InputClosed => {
                self.input_closed = true;
                Flow::Continue
            }
            AppEvent::Completed {
                request_id,
                outcome,
            } => {
                self.handle_completion(request_id, outcome)?;
                Flow::Continue
            }
        };
        if flow == Flow::Quit || (self.input_closed && !self.is_pending()) {
            return Ok(Flow::Quit);
        }
        self.output.flush()?;
        Ok(Flow::Continue)
    }

    pub fn is_pending(&self) -> bool {
        self.screen
            .as_ref()
            .is_some_and(|screen| screen.pending().is_some())
    }

    fn render_intro(&mut self) -> Result<()> {
        let client = &self.dispatcher.client;
        let models = client.models();
        writeln!(self.output, "Trinetra Ai")?;
        writeln!(self.output, "Your AI companion for creativity and code.")?;
        writeln!(
            self.output,
            "Backend: {} (chat {}, images {}, edits {})",
            client.backend_name(),
            models.chat,
            models.synthesis,
            models.edit
        )?;
        writeln!(self.output, "{SIGN_IN_REQUIRED} Type /help for commands.")?;
        self.output.flush()?;
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let intent = parse_intent(line);
        match intent.action.as_str() {
            "noop" => {}
            "quit" => return Ok(Flow::Quit),
            "help" => writeln!(self.output, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?,
            "views" => self.list_views()?,
            "login" => self.sign_in()?,
            "unknown" => writeln!(
                self.output,
                "Unknown command /{}. Type /help for commands.",
                intent.arg("command").unwrap_or_default()
            )?,
            _ if !self.signed_in => writeln!(self.output, "{SIGN_IN_REQUIRED}")?,
            "logout" => self.sign_out()?,
            "set_view" => match intent.arg("view").and_then(View::parse) {
                Some(view) => self.switch_view(view)?,
                None => writeln!(self.output, "Unknown view.")?,
            },
            "attach" => self.attach(&intent)?,
            "detach" => self.detach()?,
            "set_source" => self.set_source(&intent)?,
            "set_instruction" => self.set_instruction(&intent)?,
            "reset" => self.reset()?,
            "message" => self.submit(intent.prompt.as_deref().unwrap_or_default())?,
            other => debug!(action = other, "unhandled intent"),
        }
        Ok(Flow::Continue)
    }

    fn list_views(&mut self) -> Result<()> {
        for view in View::ALL {
            let marker = if self.signed_in && view == self.view {
                "*"
            } else {
                " "
            };
            writeln!(self.output, "{marker} {:<12} {}", view_command(view), view.label())?;
        }
        let status = match self.screen.as_ref() {
            Some(Screen::ImageGen(image)) | Some(Screen::ImageEdit(image)) => image.status(),
            _ => None,
        };
        if let Some(status) = status {
            writeln!(self.output, "{status}")?;
        }
        Ok(())
    }

    fn sign_in(&mut self) -> Result<()> {
        if self.signed_in {
            writeln!(self.output, "Already signed in.")?;
            return Ok(());
        }
        self.signed_in = true;
        writeln!(self.output, "Signed in.")?;
        self.open_view(View::Chat)
    }

    fn sign_out(&mut self) -> Result<()> {
        self.signed_in = false;
        self.screen = None;
        self.view = View::Chat;
        writeln!(self.output, "Signed out. {SIGN_IN_REQUIRED}")?;
        Ok(())
    }

    fn switch_view(&mut self, view: View) -> Result<()> {
        if view == self.view && self.screen.is_some() {
            writeln!(self.output, "Already on {view}.")?;
            return Ok(());
        }
        let cancelled = self.is_pending();
        let from = self.view;
        self.screen = None;
        self.log_event(
            "view_changed",
            json!({
                "from": from.as_str(),
                "to": view.as_str(),
                "cancelled_request": cancelled,
            }),
        );
        self.open_view(view)
    }

    fn open_view(&mut self, view: View) -> Result<()> {
        self.view = view;
        let screen = Screen::open(&self.sessions, view);
        writeln!(self.output, "== {} ==", view.label())?;
        match &screen {
            Screen::Chat(chat) => {
                for message in chat.transcript.messages() {
                    render_message(&mut self.output, message)?;
                }
                writeln!(self.output, "({})", chat.profile.placeholder)?;
            }
            Screen::ImageGen(_) => writeln!(
                self.output,
                "Describe the image you want to create, e.g. 'A majestic lion wearing a crown'."
            )?,
            Screen::ImageEdit(_) => writeln!(
                self.output,
                "Choose an image with /source PATH, then type an editing instruction."
            )?,
        }
        self.screen = Some(screen);
        Ok(())
    }

    fn attach(&mut self, intent: &Intent) -> Result<()> {
        let Some(path) = intent.arg("path").map(PathBuf::from) else {
            writeln!(self.output, "/attach requires a path")?;
            return Ok(());
        };
        let Some(Screen::Chat(chat)) = self.screen.as_mut() else {
            writeln!(self.output, "Attachments are only available on chat screens.")?;
            return Ok(());
        };
        match encode_file(&path) {
            Ok(file) => {
                writeln!(self.output, "Attached {} ({})", file.name, file.mime_type)?;
                chat.attachment = Some(Attachment { path, file });
            }
            Err(err) => writeln!(self.output, "Could not attach file: {err}")?,
        }
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        let removed = match self.screen.as_mut() {
            Some(Screen::Chat(chat)) => chat.attachment.take().is_some(),
            _ => false,
        };
        if removed {
            writeln!(self.output, "Attachment removed.")?;
        } else {
            writeln!(self.output, "Nothing attached.")?;
        }
        Ok(())
    }

    fn set_source(&mut self, intent: &Intent) -> Result<()> {
        let Some(path) = intent.arg("path").map(PathBuf::from) else {
            writeln!(self.output, "/source requires a path")?;
            return Ok(());
        };
        let Some(Screen::ImageEdit(edit)) = self.screen.as_mut() else {
            writeln!(self.output, "/source is only available on the Image Edit screen.")?;
            return Ok(());
        };
        match encode_file(&path) {
            Ok(file) if !file.is_image() => {
                writeln!(self.output, "{} is not an image.", file.name)?
            }
            Ok(file) => {
                writeln!(self.output, "Source image: {} ({})", file.name, file.mime_type)?;
                edit.clear_result();
                edit.source = Some(Attachment { path, file });
            }
            Err(err) => writeln!(self.output, "Could not load image: {err}")?,
        }
        Ok(())
    }

    fn set_instruction(&mut self, intent: &Intent) -> Result<()> {
        let Some(text) = intent.arg("text") else {
            writeln!(self.output, "/instruction requires text")?;
            return Ok(());
        };
        let Some(Screen::Chat(chat)) = self.screen.as_mut() else {
            writeln!(self.output, "/instruction is only available on chat screens.")?;
            return Ok(());
        };
        chat.restart(self.sessions.replace(chat.profile.key, text));
        writeln!(self.output, "Behavior instruction updated; conversation restarted.")?;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        match self.screen.as_mut() {
            Some(Screen::Chat(chat)) => {
                let profile = chat.profile;
                chat.restart(
                    self.sessions
                        .replace(profile.key, profile.system_instruction),
                );
                writeln!(self.output, "Conversation restarted.")?;
            }
            Some(Screen::ImageGen(image)) | Some(Screen::ImageEdit(image)) => {
                *image = ImageScreen::default();
                writeln!(self.output, "Screen cleared.")?;
            }
            None => {}
        }
        Ok(())
    }

    fn submit(&mut self, text: &str) -> Result<()> {
        let Some(screen) = self.screen.as_mut() else {
            return Ok(());
        };
        match screen {
            Screen::Chat(chat) => {
                if chat.pending.is_some() {
                    writeln!(self.output, "Still waiting for the previous reply.")?;
                    return Ok(());
                }
                if text.trim().is_empty() && chat.attachment.is_none() {
                    return Ok(());
                }
                let attachment = chat.attachment.take();
                let mut message = Message::user(text);
                if let Some(attachment) = attachment.as_ref().filter(|a| a.file.is_image()) {
                    message = message.with_image(attachment.path.display().to_string());
                }
                render_message(&mut self.output, &message)?;
                chat.transcript.push(message);

                let session = Arc::clone(&chat.session);
                let text = text.to_string();
                let file = attachment.map(|attachment| attachment.file);
                chat.pending = Some(self.dispatcher.spawn(move |client, cancel| {
                    Outcome::Reply(client.send(&session, &text, file.as_ref(), cancel))
                }));
            }
            Screen::ImageGen(image) => {
                if image.pending.is_some() {
                    writeln!(self.output, "Still generating the previous image.")?;
                    return Ok(());
                }
                if text.trim().is_empty() {
                    return Ok(());
                }
                let prompt = text.to_string();
                image.clear_result();
                writeln!(self.output, "Generating image...")?;
                image.pending = Some(self.dispatcher.spawn(move |client, cancel| {
                    Outcome::Image(client.synthesize(&prompt, cancel))
                }));
            }
            Screen::ImageEdit(edit) => {
                if edit.pending.is_some() {
                    writeln!(self.output, "Still editing the previous image.")?;
                    return Ok(());
                }
                let Some(source) = edit.source.as_ref() else {
                    edit.error = Some(EDIT_SOURCE_MISSING);
                    writeln!(self.output, "{EDIT_SOURCE_MISSING}")?;
                    return Ok(());
                };
                if text.trim().is_empty() {
                    edit.error = Some(EDIT_INSTRUCTION_MISSING);
                    writeln!(self.output, "{EDIT_INSTRUCTION_MISSING}")?;
                    return Ok(());
                }
                let file = source.file.clone();
                let instruction = text.to_string();
                edit.clear_result();
                writeln!(self.output, "Editing image...")?;
                edit.pending = Some(self.dispatcher.spawn(move |client, cancel| {
                    Outcome::Image(client.transform(&instruction, &file, cancel))
                }));
            }
        }
        Ok(())
    }

    fn handle_completion(&mut self, request_id: u64, outcome: Outcome) -> Result<()> {
        let Some(screen) = self.screen.as_mut() else {
            debug!(request_id, "discarding completion; no screen open");
            return Ok(());
        };
        if screen.take_pending(request_id).is_none() {
            debug!(request_id, "discarding completion for a torn-down request");
            return Ok(());
        }

        match (screen, outcome) {
            (Screen::Chat(chat), Outcome::Reply(result)) => {
                let reply = match result {
                    Ok(reply) => reply,
                    Err(GenAiError::Cancelled) => return Ok(()),
                    Err(_) => CHAT_FALLBACK_REPLY.to_string(),
                };
                let message = Message::model(reply);
                render_message(&mut self.output, &message)?;
                chat.transcript.push(message);
            }
            (Screen::ImageGen(image), Outcome::Image(result)) => {
                finish_image(&mut self.output, &self.out_dir, image, result, GENERATION_FAILED)?
            }
            (Screen::ImageEdit(image), Outcome::Image(result)) => {
                finish_image(&mut self.output, &self.out_dir, image, result, EDIT_FAILED)?
            }
            _ => warn!(request_id, "completion does not match the open screen"),
        }
        Ok(())
    }

    fn log_event(&self, event_type: &str, fields: Value) {
        if let Err(err) = self
            .dispatcher
            .client
            .events()
            .emit(event_type, payload(fields))
        {
            warn!(event_type, error = %err, "failed to write event");
        }
    }
}

#[cfg(test)]
impl<W: Write> App<W> {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Messages of the current chat screen.
    pub fn transcript(&self) -> Option<&[Message]> {
        match self.screen.as_ref()? {
            Screen::Chat(chat) => Some(chat.transcript.messages()),
            _ => None,
        }
    }

    /// Data URI of the current image screen's result.
    pub fn image_result(&self) -> Option<String> {
        match self.screen.as_ref()? {
            Screen::ImageGen(image) | Screen::ImageEdit(image) => {
                image.result.as_ref().map(GeneratedArtifact::data_uri)
            }
            Screen::Chat(_) => None,
        }
    }

    /// Where the current image screen's result was written.
    pub fn saved_image(&self) -> Option<&Path> {
        match self.screen.as_ref()? {
            Screen::ImageGen(image) | Screen::ImageEdit(image) => image.saved.as_deref(),
            Screen::Chat(_) => None,
        }
    }

    /// Error message shown on the current image screen.
    pub fn image_error(&self) -> Option<&'static str> {
        match self.screen.as_ref()? {
            Screen::ImageGen(image) | Screen::ImageEdit(image) => image.error,
            Screen::Chat(_) => None,
        }
    }
}

fn finish_image(
    output: &mut impl Write,
    out_dir: &Path,
    image: &mut ImageScreen,
    result: Result<GeneratedArtifact, GenAiError>,
    failure: &'static str,
) -> Result<()> {
    let artifact = match result {
        Ok(artifact) => artifact,
        Err(GenAiError::Cancelled) => return Ok(()),
        Err(_) => {
            image.error = Some(failure);
            writeln!(output, "{failure}")?;
            return Ok(());
        }
    };
    match write_artifact(out_dir, &artifact) {
        Ok(path) => {
            writeln!(output, "Image saved to {}", path.display())?;
            image.saved = Some(path);
        }
        Err(err) => writeln!(output, "Could not save image: {err:#}")?,
    }
    writeln!(output, "{}", preview_data_uri(&artifact.data_uri()))?;
    image.result = Some(artifact);
    Ok(())
}

fn render_message(output: &mut impl Write, message: &Message) -> Result<()> {
    let speaker = match message.role {
        Role::User => "You",
        Role::Model => "Trinetra",
    };
    match message.image.as_deref() {
        Some(image) if message.text.is_empty() => writeln!(output, "{speaker}: [image: {image}]")?,
        Some(image) => writeln!(output, "{speaker}: {} [image: {image}]", message.text)?,
        None => writeln!(output, "{speaker}: {}", message.text)?,
    }
    Ok(())
}

fn view_command(view: View) -> &'static str {
    match view {
        View::Chat => "/chat",
        View::Vibecoding => "/vibecoding",
        View::ImageGen => "/imagine",
        View::ImageEdit => "/edit",
    }
}

fn preview_data_uri(uri: &str) -> String {
    let total = uri.chars().count();
    if total <= DATA_URI_PREVIEW_CHARS {
        return uri.to_string();
    }
    let head: String = uri.chars().take(DATA_URI_PREVIEW_CHARS).collect();
    format!("{head}... ({total} chars)")
}

/// Forwards stdin lines onto the app channel from a dedicated thread.
pub fn spawn_stdin_reader(tx: mpsc::Sender<AppEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(AppEvent::Input(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
        let _ = tx.send(AppEvent::InputClosed);
    });
}
