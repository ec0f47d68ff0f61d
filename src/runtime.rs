use std::time::Duration;

use color_eyre::eyre::Result;
use futures::stream::StreamExt;
use ratatui::prelude::Backend;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::application::Application;
use crate::command::{Action, Command};
use crate::subscription::SubscriptionManager;

/// Drives an [`Application`]: delivers messages to `update`, runs the
/// commands it returns, keeps its subscriptions in sync and redraws.
///
/// Messages are processed as soon as they arrive; redraws happen at most once
/// per frame. [`Action::Quit`] stops the loop right away, cancelling running
/// subscriptions and commands.
pub struct Runtime<A: Application> {
    app: A,
    init: Option<Command<A::Message>>,
    tx: mpsc::UnboundedSender<Action<A::Message>>,
    rx: mpsc::UnboundedReceiver<Action<A::Message>>,
    subscriptions: SubscriptionManager<A::Message>,
    commands: JoinSet<()>,
}

impl<A: Application> Runtime<A> {
    /// Builds the application from `flags`. Its initial command runs when
    /// [`run`](Self::run) starts.
    pub fn new(flags: A::Flags) -> Self {
        let (app, init) = A::new(flags);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new(tx.clone());

        Self {
            app,
            init: Some(init),
            tx,
            rx,
            subscriptions,
            commands: JoinSet::new(),
        }
    }

    fn execute(&mut self, cmd: Command<A::Message>) {
        let Some(mut stream) = cmd.stream else {
            return;
        };
        let tx = self.tx.clone();
        self.commands.spawn(async move {
            while let Some(action) = stream.next().await {
                if tx.send(action).is_err() {
                    break;
                }
            }
        });
    }

    /// Runs `update` for `msg` and applies its effects.
    fn dispatch(&mut self, msg: A::Message) {
        let cmd = self.app.update(msg);
        self.execute(cmd);
        self.subscriptions.update(self.app.subscriptions());
    }

    /// Runs the event loop until the application quits.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing to the terminal fails.
    pub async fn run<B: Backend>(
        mut self,
        terminal: &mut ratatui::Terminal<B>,
        frame_rate: u32,
    ) -> Result<()> {
        let frame_duration = Duration::from_secs(1) / frame_rate.max(1);
        let mut frames = interval(frame_duration);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if let Some(init) = self.init.take() {
            self.execute(init);
        }
        self.subscriptions.update(self.app.subscriptions());
        info!(frame_rate, "runtime started");

        let mut dirty = true;
        loop {
            tokio::select! {
                action = self.rx.recv() => match action {
                    Some(Action::Message(msg)) => {
                        self.dispatch(msg);
                        dirty = true;
                    }
                    Some(Action::Quit) | None => break,
                },
                _ = frames.tick() => {
                    if dirty {
                        terminal.draw(|frame| self.app.view(frame))?;
                        dirty = false;
                    }
                }
                // reap finished command tasks
                Some(_) = self.commands.join_next() => {}
            }
        }

        debug!(
            subscriptions = self.subscriptions.len(),
            commands = self.commands.len(),
            "runtime stopping"
        );
        self.commands.shutdown().await;
        self.subscriptions.shutdown().await;
        Ok(())
    }
}
