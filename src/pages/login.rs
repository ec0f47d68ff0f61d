//! `/login`: credential check against the authentication endpoint.
//!
//! The returned token is only acknowledged; sessions are not kept.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use futures::FutureExt;
use ratatui::prelude::*;
use ratatui::widgets::Block;
use tracing::debug;

use super::widgets::{form_height, render_form};
use super::{Context, Notice, take};
use crate::api::{AccessToken, Credentials};
use crate::command::Command;
use crate::form::{Field, Form, FormValues, Rule, Schema};
use crate::router::Route;
use crate::subscription::Subscription;
use crate::subscription::http::{Mutation, MutationSettled, QueryError};

pub fn login_schema() -> Schema {
    Schema::new()
        .field(Field::new("login", "Login").rule(Rule::required("Required")))
        .field(
            Field::new("password", "Password")
                .secret()
                .rule(Rule::required("Required")),
        )
}

fn credentials(mut values: FormValues) -> Credentials {
    Credentials {
        login: take(&mut values, "login"),
        password: take(&mut values, "password"),
    }
}

fn login_notice(result: &Result<AccessToken, QueryError>) -> Notice {
    match result {
        Ok(token) => Notice::success(format!(
            "Login successful! ({} token issued)",
            token.token_type
        )),
        Err(error) => Notice::error(match error.status() {
            Some(400 | 401) => "Login failed. Check your login and password.",
            _ => "Login failed. Please try again.",
        }),
    }
}

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Submit,
    LoggedIn(MutationSettled<AccessToken>),
    Navigate(Route),
    Notify(Notice),
}

#[derive(Debug)]
pub struct LoginPage {
    form: Form,
    login: Mutation<Credentials, AccessToken>,
}

impl LoginPage {
    pub fn new(ctx: &Context) -> Self {
        let api = Arc::clone(&ctx.api);
        Self {
            form: Form::new(login_schema(), ctx.reset_policy),
            login: Mutation::new("login", move |credentials: Credentials| {
                let api = Arc::clone(&api);
                async move { api.login(credentials).await }.boxed()
            }),
        }
    }

    pub const fn form(&self) -> &Form {
        &self.form
    }

    pub const fn login(&self) -> &Mutation<Credentials, AccessToken> {
        &self.login
    }

    pub fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Key(key) => {
                match key.code {
                    KeyCode::Tab | KeyCode::Down => self.form.focus_next(),
                    KeyCode::BackTab | KeyCode::Up => self.form.focus_prev(),
                    KeyCode::Enter => return Command::message(Message::Submit),
                    KeyCode::Char(c) => self.form.input(c),
                    KeyCode::Backspace => self.form.backspace(),
                    _ => {}
                }
                Command::none()
            }
            Message::Submit => {
                if self.login.is_pending() {
                    return Command::none();
                }
                match self.form.submit() {
                    Some(values) => self.login.mutate(credentials(values)).map(Message::LoggedIn),
                    None => Command::none(),
                }
            }
            Message::LoggedIn(settled) if !self.login.owns(&settled) => {
                Self::detached(Message::LoggedIn(settled))
            }
            Message::LoggedIn(settled) => match self.login.settle(settled) {
                Some(result) => {
                    self.form.on_settled(result.is_ok());
                    Command::message(Message::Notify(login_notice(&result)))
                }
                None => Command::none(),
            },
            Message::Navigate(_) | Message::Notify(_) => Command::none(),
        }
    }

    /// Handles a message whose page instance is gone.
    pub fn detached(msg: Message) -> Command<Message> {
        match msg {
            Message::LoggedIn(settled) => {
                Command::message(Message::Notify(login_notice(settled.result())))
            }
            msg => {
                debug!(?msg, "dropping message for an unmounted login page");
                Command::none()
            }
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription<Message>> {
        vec![]
    }

    pub fn view(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::bordered().title("Log in");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [inner, _] =
            Layout::vertical([Constraint::Length(form_height(&self.form)), Constraint::Min(0)])
                .areas(inner);
        render_form(
            frame,
            inner,
            &self.form,
            true,
            "Log in",
            self.login.is_pending(),
        );
    }
}
