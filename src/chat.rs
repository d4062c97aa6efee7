//! Interactive chat loop: slash commands and free-text turns over a [`Session`].

use crate::image::{ImageFormat, ImageService};
use crate::session::Session;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Prefix marking a line as a command.
pub const COMMAND_PREFIX: char = '/';

/// Prompt shown before each line of input.
pub const PROMPT: &str = "You: ";

/// Slash commands understood by the chat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/save [filename]`
    Save(Option<String>),
    /// `/load <path>`
    Load(Option<String>),
    /// `/clear`
    Clear,
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// Anything else starting with `/`.
    Unknown(String),
}

/// A classified line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line.
    Empty,
    /// Slash command.
    Command(Command),
    /// Text for the model.
    Message(String),
}

/// Classifies one raw line of input.
pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with(COMMAND_PREFIX) {
        return Input::Message(line.to_string());
    }

    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim().to_string())),
        None => (line, None),
    };
    let arg = arg.filter(|a| !a.is_empty());

    let command = match name.to_lowercase().as_str() {
        "/save" => Command::Save(arg),
        "/load" => Command::Load(arg),
        "/clear" => Command::Clear,
        "/quit" => Command::Quit,
        "/help" => Command::Help,
        _ => Command::Unknown(name.to_string()),
    };
    Input::Command(command)
}

/// What the input side produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A line, without its trailing newline.
    Line(String),
    /// Input closed.
    Eof,
    /// User pressed Ctrl-C.
    Interrupted,
}

/// Source of input lines for [`Dispatcher::run`].
pub trait LineSource {
    /// Shows `prompt` (if the source is interactive) and reads one line.
    fn read_line(&mut self, prompt: &str) -> io::Result<LineEvent>;
}

/// Reads lines from any buffered reader; never reports interrupts.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    /// Wraps a reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn read_line(&mut self, _prompt: &str) -> io::Result<LineEvent> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(LineEvent::Eof);
        }
        Ok(LineEvent::Line(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Whether the loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Stop reading.
    Quit,
}

/// Routes input lines to the session or the image service and reports
/// results to `out`.
pub struct Dispatcher<W> {
    out: W,
    output_dir: PathBuf,
    image_count: u32,
}

impl<W: Write> Dispatcher<W> {
    /// Creates a dispatcher that saves images under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, out: W) -> Self {
        Self {
            out,
            output_dir: output_dir.into(),
            image_count: 0,
        }
    }

    /// Consumes the dispatcher, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints the greeting shown when the chat starts.
    pub fn banner(&mut self, session: &Session) -> io::Result<()> {
        writeln!(self.out, "Gemini Image Chat ({})", session.config().model)?;
        writeln!(self.out, "Commands: /save [name], /load <path>, /clear, /help, /quit")?;
        writeln!(self.out, "{}", "-".repeat(50))
    }

    /// Reads and handles lines until `/quit`, end of input or an interrupt.
    pub async fn run(
        &mut self,
        session: &mut Session,
        service: &dyn ImageService,
        input: &mut dyn LineSource,
    ) -> io::Result<()> {
        loop {
            let line = match input.read_line(PROMPT)? {
                LineEvent::Line(line) => line,
                LineEvent::Eof | LineEvent::Interrupted => {
                    writeln!(self.out, "\nGoodbye!")?;
                    return Ok(());
                }
            };

            if self.handle_line(session, service, &line).await? == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Handles one line of input.
    ///
    /// Only I/O errors on `out` are returned; everything else is reported
    /// inline and the loop continues.
    pub async fn handle_line(
        &mut self,
        session: &mut Session,
        service: &dyn ImageService,
        line: &str,
    ) -> io::Result<Flow> {
        match parse_line(line) {
            Input::Empty => Ok(Flow::Continue),
            Input::Command(command) => self.handle_command(session, command),
            Input::Message(message) => {
                self.handle_message(session, service, &message).await?;
                Ok(Flow::Continue)
            }
        }
    }

    fn handle_command(&mut self, session: &mut Session, command: Command) -> io::Result<Flow> {
        match command {
            Command::Quit => {
                writeln!(self.out, "Goodbye!")?;
                return Ok(Flow::Quit);
            }
            Command::Clear => {
                session.clear();
                writeln!(self.out, "Conversation cleared.")?;
            }
            Command::Save(name) => {
                let Some(format) = session.current_image().map(|i| i.format()) else {
                    writeln!(self.out, "No image to save.")?;
                    return Ok(Flow::Continue);
                };
                let path = match name {
                    Some(name) => self.output_dir.join(name),
                    None => self.next_image_path(format),
                };
                match session.save(&path) {
                    Ok(()) => writeln!(self.out, "Image saved to: {}", path.display())?,
                    Err(e) => writeln!(self.out, "Error: {e}")?,
                }
            }
            Command::Load(None) => {
                writeln!(self.out, "Usage: /load <path>")?;
            }
            Command::Load(Some(path)) => match session.load(&path) {
                Ok(_) => {
                    writeln!(self.out, "Loaded: {path}")?;
                    writeln!(self.out, "You can now describe edits to make.")?;
                }
                Err(e) => writeln!(self.out, "Error loading image: {e}")?,
            },
            Command::Help => {
                writeln!(self.out, "  /save [name]  save the current image")?;
                writeln!(self.out, "  /load <path>  load an image into the conversation")?;
                writeln!(self.out, "  /clear        start a fresh conversation")?;
                writeln!(self.out, "  /quit         exit")?;
            }
            Command::Unknown(name) => {
                writeln!(self.out, "Unknown command: {name}")?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_message(
        &mut self,
        session: &mut Session,
        service: &dyn ImageService,
        message: &str,
    ) -> io::Result<()> {
        let reply = match session.send(service, message, None).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(kind = ?e.kind(), "chat turn failed");
                return writeln!(self.out, "\nError: {e}");
            }
        };

        if let Some(text) = reply.text {
            writeln!(self.out, "\nGemini: {text}")?;
        }

        if let Some(image) = reply.image {
            let path = self.next_image_path(image.format());
            match image.save(&path) {
                Ok(()) => writeln!(self.out, "\n[Image generated: {}]", path.display())?,
                Err(e) => writeln!(self.out, "\nError: {e}")?,
            }
        }
        Ok(())
    }

    /// Timestamped path for the next auto-named image.
    fn next_image_path(&mut self, format: ImageFormat) -> PathBuf {
        self.image_count += 1;
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.output_dir.join(format!(
            "image_{timestamp}_{}.{}",
            self.image_count,
            format.extension()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImagegenError;
    use crate::image::stub::StubService;
    use crate::image::{fixtures, GenerationConfig};
    use std::path::Path;

    fn dispatcher(dir: &Path) -> Dispatcher<Vec<u8>> {
        Dispatcher::new(dir, Vec::new())
    }

    fn output(d: Dispatcher<Vec<u8>>) -> String {
        String::from_utf8(d.into_inner()).unwrap()
    }

    fn saved_images(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("image_"))
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_parse_line_variants() {
        assert_eq!(parse_line(""), Input::Empty);
        assert_eq!(parse_line("   "), Input::Empty);
        assert_eq!(
            parse_line("  a cat in space "),
            Input::Message("a cat in space".into())
        );
        assert_eq!(parse_line("/quit"), Input::Command(Command::Quit));
        assert_eq!(parse_line("/QUIT"), Input::Command(Command::Quit));
        assert_eq!(parse_line("/clear"), Input::Command(Command::Clear));
        assert_eq!(parse_line("/help"), Input::Command(Command::Help));
        assert_eq!(parse_line("/save"), Input::Command(Command::Save(None)));
        assert_eq!(
            parse_line("/save  my cat.png "),
            Input::Command(Command::Save(Some("my cat.png".into())))
        );
        assert_eq!(parse_line("/load"), Input::Command(Command::Load(None)));
        assert_eq!(
            parse_line("/load photos/a.png"),
            Input::Command(Command::Load(Some("photos/a.png".into())))
        );
        assert_eq!(
            parse_line("/sve out.png"),
            Input::Command(Command::Unknown("/sve".into()))
        );
    }

    #[tokio::test]
    async fn test_load_then_save_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        std::fs::write(&src, fixtures::png_bytes()).unwrap();

        let service = StubService::returning(None, None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        let load = format!("/load {}", src.display());
        d.handle_line(&mut session, &service, &load).await.unwrap();
        d.handle_line(&mut session, &service, "/save").await.unwrap();

        let saved = saved_images(dir.path());
        assert_eq!(saved.len(), 1);
        assert_ne!(saved[0], src);
        assert!(saved[0]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("_1.png"));
        assert_eq!(std::fs::read(&saved[0]).unwrap(), fixtures::png_bytes());
        assert_eq!(service.calls(), 0);

        let out = output(d);
        assert!(out.contains(&format!("Loaded: {}", src.display())));
        assert!(out.contains("Image saved to: "));
    }

    #[tokio::test]
    async fn test_save_named_goes_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(Some(fixtures::png()), None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        d.handle_line(&mut session, &service, "a red circle")
            .await
            .unwrap();
        d.handle_line(&mut session, &service, "/save circle.png")
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("circle.png")).unwrap(),
            fixtures::png_bytes()
        );
    }

    #[tokio::test]
    async fn test_save_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(None, None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        let flow = d.handle_line(&mut session, &service, "/save").await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(saved_images(dir.path()).is_empty());
        assert!(output(d).contains("No image to save."));
    }

    #[tokio::test]
    async fn test_message_auto_saves_generated_image() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(Some(fixtures::jpeg()), Some("A cat, in space."));
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        d.handle_line(&mut session, &service, "a cat in space")
            .await
            .unwrap();

        let saved = saved_images(dir.path());
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(&saved[0]).unwrap(), fixtures::jpeg_bytes());

        let out = output(d);
        assert!(out.contains("Gemini: A cat, in space."));
        assert!(out.contains("[Image generated: "));
    }

    #[tokio::test]
    async fn test_service_error_is_reported_inline() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(Some(fixtures::png()), None)
            .then_fail(ImagegenError::ContentBlocked("nope".into()));
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        let flow = d
            .handle_line(&mut session, &service, "something spicy")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(session.is_empty());
        assert!(output(d).contains("Error: content blocked: nope"));
    }

    #[tokio::test]
    async fn test_unknown_command_does_not_touch_session() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        std::fs::write(&src, fixtures::png_bytes()).unwrap();

        let service = StubService::returning(Some(fixtures::png()), None);
        let mut session = Session::new(GenerationConfig::default());
        session.load(&src).unwrap();
        let mut d = dispatcher(dir.path());

        let flow = d
            .handle_line(&mut session, &service, "/sve out.png")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(service.calls(), 0);
        assert!(session.turns().is_empty());
        assert!(session.current_image().is_some());
        assert!(output(d).contains("Unknown command: /sve"));
    }

    #[tokio::test]
    async fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(None, None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        d.handle_line(&mut session, &service, "/load").await.unwrap();
        d.handle_line(&mut session, &service, "/load nonexistent.png")
            .await
            .unwrap();

        assert!(session.current_image().is_none());
        let out = output(d);
        assert!(out.contains("Usage: /load <path>"));
        assert!(out.contains("Error loading image: "));
    }

    #[tokio::test]
    async fn test_clear_resets_session() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(Some(fixtures::png()), None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        d.handle_line(&mut session, &service, "a red circle")
            .await
            .unwrap();
        d.handle_line(&mut session, &service, "/clear").await.unwrap();

        assert!(session.is_empty());
        assert!(output(d).contains("Conversation cleared."));
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(Some(fixtures::png()), None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        let script = "\n/help\na red circle\n/quit\nnever sent\n";
        let mut input = ReaderSource::new(script.as_bytes());
        d.run(&mut session, &service, &mut input).await.unwrap();

        assert_eq!(service.calls(), 1);
        let out = output(d);
        assert!(out.contains("/load <path>"));
        assert!(out.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_run_ends_on_eof() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(None, Some("hi"));
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        let mut input = ReaderSource::new("hello\n".as_bytes());
        d.run(&mut session, &service, &mut input).await.unwrap();

        assert_eq!(service.calls(), 1);
        assert!(output(d).trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_run_ends_on_interrupt() {
        struct Interrupting;

        impl LineSource for Interrupting {
            fn read_line(&mut self, _prompt: &str) -> io::Result<LineEvent> {
                Ok(LineEvent::Interrupted)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let service = StubService::returning(None, None);
        let mut session = Session::new(GenerationConfig::default());
        let mut d = dispatcher(dir.path());

        d.run(&mut session, &service, &mut Interrupting)
            .await
            .unwrap();

        assert!(output(d).contains("Goodbye!"));
    }

    #[test]
    fn test_auto_names_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(dir.path());

        let first = d.next_image_path(ImageFormat::Png);
        let second = d.next_image_path(ImageFormat::Png);

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(dir.path()));
    }
}
