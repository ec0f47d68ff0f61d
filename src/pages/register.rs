//! `/register`: account creation.

use std::sync::{Arc, LazyLock};

use crossterm::event::{KeyCode, KeyEvent};
use futures::FutureExt;
use ratatui::prelude::*;
use ratatui::widgets::Block;
use regex::Regex;
use tracing::debug;

use super::widgets::{form_height, render_form};
use super::{Context, Notice, take};
use crate::api::RegisterData;
use crate::command::Command;
use crate::form::{Field, Form, FormValues, Rule, Schema};
use crate::router::Route;
use crate::subscription::Subscription;
use crate::subscription::http::{Mutation, MutationSettled, QueryError};

#[allow(clippy::expect_used)]
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("phone pattern is valid"));

pub fn register_schema() -> Schema {
    Schema::new()
        .field(
            Field::new("login", "Login")
                .rule(Rule::required("Required"))
                .rule(Rule::min_length(5, "Login must be at least 5 characters")),
        )
        .field(
            Field::new("phone", "Phone number")
                .rule(Rule::required("Required"))
                .rule(Rule::matches(
                    PHONE.clone(),
                    "Phone number must be exactly 10 digits",
                )),
        )
        .field(Field::new("first_name", "First name").rule(Rule::required("Required")))
        .field(Field::new("middle_name", "Middle name").rule(Rule::required("Required")))
        .field(Field::new("last_name", "Last name").rule(Rule::required("Required")))
        .field(
            Field::new("password", "Password")
                .secret()
                .rule(Rule::required("Required"))
                .rule(Rule::min_length(8, "Password must be at least 8 characters")),
        )
}

fn register_data(mut values: FormValues) -> RegisterData {
    RegisterData {
        login: take(&mut values, "login"),
        phone: take(&mut values, "phone"),
        first_name: take(&mut values, "first_name"),
        middle_name: take(&mut values, "middle_name"),
        last_name: take(&mut values, "last_name"),
        password: take(&mut values, "password"),
    }
}

fn registered_notice(result: &Result<(), QueryError>) -> Notice {
    match result {
        Ok(()) => Notice::success("Registration successful!"),
        Err(_) => Notice::error("Registration failed. Please try again."),
    }
}

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Submit,
    Registered(MutationSettled<()>),
    Navigate(Route),
    Notify(Notice),
}

#[derive(Debug)]
pub struct RegisterPage {
    form: Form,
    register: Mutation<RegisterData, ()>,
}

impl RegisterPage {
    pub fn new(ctx: &Context) -> Self {
        let api = Arc::clone(&ctx.api);
        Self {
            form: Form::new(register_schema(), ctx.reset_policy),
            register: Mutation::new("register", move |data: RegisterData| {
                let api = Arc::clone(&api);
                async move { api.register(data).await }.boxed()
            }),
        }
    }

    pub const fn form(&self) -> &Form {
        &self.form
    }

    pub const fn register(&self) -> &Mutation<RegisterData, ()> {
        &self.register
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
                if self.register.is_pending() {
                    return Command::none();
                }
                match self.form.submit() {
                    Some(values) => self
                        .register
                        .mutate(register_data(values))
                        .map(Message::Registered),
                    None => Command::none(),
                }
            }
            Message::Registered(settled) if !self.register.owns(&settled) => {
                Self::detached(Message::Registered(settled))
            }
            Message::Registered(settled) => match self.register.settle(settled) {
                Some(result) => {
                    self.form.on_settled(result.is_ok());
                    Command::message(Message::Notify(registered_notice(&result)))
                }
                None => Command::none(),
            },
            Message::Navigate(_) | Message::Notify(_) => Command::none(),
        }
    }

    /// Handles a message whose page instance is gone. The outcome of a
    /// registration is reported wherever the user went meanwhile.
    pub fn detached(msg: Message) -> Command<Message> {
        match msg {
            Message::Registered(settled) => {
                Command::message(Message::Notify(registered_notice(settled.result())))
            }
            msg => {
                debug!(?msg, "dropping message for an unmounted register page");
                Command::none()
            }
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription<Message>> {
        vec![]
    }

    pub fn view(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::bordered().title("Register");
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
            "Register",
            self.register.is_pending(),
        );
    }
}
