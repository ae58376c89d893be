//! Interactive terminal front end.
//!
//! One loop multiplexes typed commands with scheduler events. Device calls
//! never run on this loop directly: refreshes and toggles are spawned and
//! report back through the event channel.

use std::{io::Write, str::FromStr, sync::Arc};

use crossterm::style::Stylize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::UnboundedReceiver,
};
use tracing::debug;

use crate::{
    error::Result,
    scheduler::{Event, Scheduler},
    view::View,
};

pub const HELP: &str = "\
Commands:
  r, refresh     discover plugs now
  t, toggle N    switch plug N on or off
  f, forget N    hide plug N until restart
  l, list        show the plug list again
  h, help        show this help
  q, quit        leave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Toggle(usize),
    Forget(usize),
    List,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or("").to_lowercase();
        let row = words.next().map(|word| {
            word.parse::<usize>()
                .map_err(|_| format!("'{}' is not a row number", word))
        });
        if let Some(extra) = words.next() {
            return Err(format!("Unexpected '{}'", extra));
        }

        let needs_row = |make: fn(usize) -> Command| match row {
            Some(Ok(row)) => Ok(make(row)),
            Some(Err(message)) => Err(message),
            None => Err(format!("'{}' needs a row number", verb)),
        };

        match verb.as_str() {
            "r" | "refresh" => Ok(Command::Refresh),
            "t" | "toggle" => needs_row(Command::Toggle),
            "f" | "forget" => needs_row(Command::Forget),
            "l" | "list" => Ok(Command::List),
            "h" | "help" | "?" => Ok(Command::Help),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{}', try 'help'", other)),
        }
    }
}

pub struct Console<O, E> {
    scheduler: Arc<Scheduler>,
    events: UnboundedReceiver<Event>,
    view: View,
    out: O,
    err: E,
    drawn: bool,
}

impl<O: Write, E: Write> Console<O, E> {
    pub fn new(scheduler: Arc<Scheduler>, events: UnboundedReceiver<Event>, out: O, err: E) -> Self {
        Self {
            scheduler,
            events,
            view: View::new(),
            out,
            err,
            drawn: false,
        }
    }

    /// Run until `quit` or end of input. The refresh timer lives exactly as
    /// long as this call.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<()> {
        let timer = self.scheduler.start();
        writeln!(self.out, "Looking for plugs, type 'help' for commands.")?;

        let mut lines = input.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => break,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(Command::Quit) => break,
                        Ok(command) => self.dispatch(command).await?,
                        Err(message) => writeln!(self.err, "{}", message)?,
                    }
                }
                Some(event) = self.events.recv() => self.handle(event).await?,
            }
        }

        timer.stop();
        debug!("console closed");
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Refresh => {
                self.scheduler.trigger();
            }
            Command::Toggle(row) => match self.view.device_at(row) {
                Some(id) => {
                    let id = id.to_string();
                    let scheduler = Arc::clone(&self.scheduler);
                    // failures arrive as notices
                    tokio::spawn(async move { scheduler.toggle(&id).await });
                }
                None => writeln!(self.err, "No plug in row {}", row)?,
            },
            Command::Forget(row) => match self.view.device_at(row) {
                Some(id) => {
                    let id = id.to_string();
                    if let Err(err) = self.scheduler.forget(&id).await {
                        writeln!(self.err, "{}", err)?;
                    }
                }
                None => writeln!(self.err, "No plug in row {}", row)?,
            },
            Command::List => self.draw()?,
            Command::Help => writeln!(self.out, "{}", HELP)?,
            Command::Quit => {}
        }
        Ok(())
    }

    async fn handle(&mut self, event: Event) -> Result<()> {
        match event {
            Event::RegistryUpdated => {
                let report = {
                    let registry = self.scheduler.registry().read().await;
                    self.view.sync(&registry, self.scheduler.settings())
                };
                debug!(?report, "view synchronised");
                if !self.drawn || report.added + report.updated + report.removed > 0 {
                    self.draw()?;
                }
            }
            Event::Notice(notice) => {
                if self.scheduler.settings().color {
                    writeln!(self.err, "{} {}", "error:".red().bold(), notice.message)?;
                } else {
                    writeln!(self.err, "error: {}", notice.message)?;
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        self.view.render(&mut self.out, self.scheduler.settings().color)?;
        writeln!(self.out)?;
        self.drawn = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{fake::FakeClient, PowerState};
    use crate::config::Settings;
    use crate::scheduler::{Notice, NoticeKind};
    use tokio::sync::mpsc::unbounded_channel;

    fn console(client: &Arc<FakeClient>) -> Console<Vec<u8>, Vec<u8>> {
        let settings = Settings {
            color: false,
            ..Settings::default()
        };
        let (tx, rx) = unbounded_channel();
        let scheduler = Arc::new(Scheduler::new(client.clone(), settings, tx));
        Console::new(scheduler, rx, Vec::new(), Vec::new())
    }

    async fn next_event<O: Write, E: Write>(console: &mut Console<O, E>) {
        let event = console.events.recv().await.unwrap();
        console.handle(event).await.unwrap();
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Ok(Command::Refresh), "r".parse());
        assert_eq!(Ok(Command::Toggle(2)), "toggle 2".parse());
        assert_eq!(Ok(Command::Forget(1)), " F 1 ".parse());
        assert_eq!(Ok(Command::Quit), "quit".parse());
        assert!("t".parse::<Command>().is_err());
        assert!("t two".parse::<Command>().is_err());
        assert!("t 1 2".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn refresh_draws_rows() {
        let client = Arc::new(FakeClient::new());
        client.add("a", 10, PowerState::On);
        let mut console = console(&client);

        console.scheduler.refresh().await;
        next_event(&mut console).await;

        let out = String::from_utf8(console.out.clone()).unwrap();
        assert!(out.contains("Plug a"));
        assert!(out.contains("[switch off]"));
    }

    #[tokio::test]
    async fn toggle_row_switches_plug() {
        let client = Arc::new(FakeClient::new());
        client.add("a", 10, PowerState::Off);
        let mut console = console(&client);
        console.scheduler.refresh().await;
        next_event(&mut console).await;

        console.dispatch(Command::Toggle(1)).await.unwrap();
        // optimistic flip, then confirmation
        next_event(&mut console).await;
        assert_eq!(PowerState::On, console.scheduler.registry().read().await.get("a").unwrap().power);
        next_event(&mut console).await;

        assert_eq!(Some(PowerState::On), client.power("a"));
        assert_eq!("switch off", console.view.rows()[0].button);
    }

    #[tokio::test]
    async fn failed_toggle_is_reported() {
        let client = Arc::new(FakeClient::new());
        client.add("a", 10, PowerState::Off);
        client.fail_set(true);
        let mut console = console(&client);
        console.scheduler.refresh().await;
        next_event(&mut console).await;

        console.dispatch(Command::Toggle(1)).await.unwrap();
        for _ in 0..3 {
            next_event(&mut console).await;
        }

        let err = String::from_utf8(console.err.clone()).unwrap();
        assert!(err.starts_with("error: Could not switch Plug a"));
        assert_eq!("switch on", console.view.rows()[0].button);
    }

    #[tokio::test]
    async fn coloured_notice_keeps_message() {
        let client = Arc::new(FakeClient::new());
        let (tx, rx) = unbounded_channel();
        let scheduler = Arc::new(Scheduler::new(client.clone(), Settings::default(), tx));
        let mut console = Console::new(scheduler, rx, Vec::new(), Vec::new());

        let notice = Notice {
            kind: NoticeKind::Discovery,
            message: String::from("Discovery failed: no route"),
        };
        console.handle(Event::Notice(notice)).await.unwrap();

        let err = String::from_utf8(console.err.clone()).unwrap();
        assert!(err.contains("error:"));
        assert!(err.ends_with(" Discovery failed: no route\n"));
    }

    #[tokio::test]
    async fn forget_removes_row() {
        let client = Arc::new(FakeClient::new());
        client.add("a", 10, PowerState::Off);
        client.add("b", 11, PowerState::Off);
        let mut console = console(&client);
        console.scheduler.refresh().await;
        next_event(&mut console).await;

        console.dispatch(Command::Forget(1)).await.unwrap();
        next_event(&mut console).await;

        assert_eq!(Some("b"), console.view.device_at(1));
        assert_eq!(None, console.view.device_at(2));
    }

    #[tokio::test]
    async fn unknown_row_is_reported() {
        let client = Arc::new(FakeClient::new());
        let mut console = console(&client);

        console.dispatch(Command::Toggle(4)).await.unwrap();

        assert_eq!("No plug in row 4\n", String::from_utf8(console.err.clone()).unwrap());
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let client = Arc::new(FakeClient::new());
        let console = console(&client);

        console.run(&b"help\nq\n"[..]).await.unwrap();
    }
}
