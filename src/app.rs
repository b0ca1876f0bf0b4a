use std::sync::Arc;
use commandr_core::{
    BridgeReceiver, ChatController, ChatRole, CohereClient, Config, ConversationId, Envelope,
    MessageHandle, Severity, StreamEvent,
};

const TEMPERATURE_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    User,
    Assistant,
    Notice(Severity),
}

/// One entry in the chat pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: LineKind,
    pub content: String,
    pub handle: Option<MessageHandle>,
}

impl ChatLine {
    fn new(kind: LineKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            handle: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub severity: Severity,
}

pub struct App {
    pub should_quit: bool,
    pub controller: ChatController,
    bridge: BridgeReceiver,

    // Chat view of the active conversation
    pub chat_lines: Vec<ChatLine>,
    pub status: Option<Status>,
    pub key_source: Option<&'static str>,

    // Prompt input
    pub input: String,
    pub cursor: usize, // in chars

    // Scrolling
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    pub animation_frame: u8,
}

impl App {
    /// Must run inside the tokio runtime; the controller spawns its worker
    pub fn new(config: &Config) -> Self {
        let client = CohereClient::new(&config.api_key().unwrap_or_default());
        let (controller, bridge) = ChatController::new(
            Arc::new(client),
            config.calendar_sink(),
            config.chat_settings(),
        );
        let mut app = Self::with_controller(controller, bridge);
        app.key_source = config.key_source();
        if app.key_source.is_none() {
            app.set_status("No API key found. Set CO_API_KEY to chat.", Severity::Warning);
        }
        app
    }

    pub fn with_controller(controller: ChatController, bridge: BridgeReceiver) -> Self {
        Self {
            should_quit: false,
            controller,
            bridge,
            chat_lines: Vec::new(),
            status: None,
            key_source: None,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>, severity: Severity) {
        self.status = Some(Status {
            text: text.into(),
            severity,
        });
    }

    pub fn is_busy(&self) -> bool {
        self.controller
            .active_conversation()
            .is_some_and(|id| self.controller.is_busy(id))
    }

    pub fn active_title(&self) -> Option<String> {
        let active = self.controller.active_conversation()?;
        self.controller
            .conversations()
            .into_iter()
            .find(|c| c.id == active)
            .map(|c| c.title)
    }

    /// Called on every tick: pick up whatever the worker produced
    pub fn tick(&mut self) {
        let envelopes = self.bridge.drain();
        if !envelopes.is_empty() {
            for envelope in envelopes {
                self.apply(envelope);
            }
            self.scroll_to_bottom();
        }
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn apply(&mut self, envelope: Envelope) {
        self.apply_event(envelope.conversation, envelope.event);
    }

    pub fn apply_event(&mut self, conversation: ConversationId, event: StreamEvent) {
        // Events for a conversation that is not on screen show up from the
        // store when the user switches back
        if self.controller.active_conversation() != Some(conversation) {
            return;
        }

        match event {
            StreamEvent::NewMessage {
                handle,
                role,
                content,
            } => {
                let kind = match role {
                    ChatRole::User => LineKind::User,
                    ChatRole::Assistant => LineKind::Assistant,
                    ChatRole::System => LineKind::Notice(Severity::Info),
                };
                self.chat_lines.push(ChatLine {
                    kind,
                    content,
                    handle: Some(handle),
                });
            }
            StreamEvent::AppendToMessage { handle, content } => {
                match self
                    .chat_lines
                    .iter_mut()
                    .rev()
                    .find(|line| line.handle == Some(handle))
                {
                    Some(line) => line.content = content,
                    None => self.chat_lines.push(ChatLine {
                        kind: LineKind::Assistant,
                        content,
                        handle: Some(handle),
                    }),
                }
            }
            StreamEvent::StatusUpdate { text, severity } => {
                if severity == Severity::Error {
                    self.chat_lines
                        .push(ChatLine::new(LineKind::Notice(severity), text.as_str()));
                }
                self.set_status(text, severity);
            }
        }
    }

    pub fn submit(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return;
        }

        match self.controller.submit(&prompt) {
            Ok(id) => {
                tracing::debug!(request = %id, "prompt submitted");
                self.chat_lines.push(ChatLine::new(LineKind::User, prompt));
                self.input.clear();
                self.cursor = 0;
                self.set_status("Thinking", Severity::Info);
                self.scroll_to_bottom();
            }
            Err(e) => self.set_status(e.to_string(), Severity::Error),
        }
    }

    /// Abandon whatever the active conversation is waiting on
    pub fn cancel_active(&mut self) {
        if let Some(id) = self.controller.active_conversation() {
            if self.controller.cancel(id) > 0 {
                self.set_status("Request cancelled", Severity::Info);
            }
        }
    }

    pub fn new_conversation(&mut self) {
        self.controller.new_conversation();
        self.reload_view();
        self.set_status("Started a new conversation", Severity::Info);
    }

    pub fn cycle_conversation(&mut self, forward: bool) {
        let conversations = self.controller.conversations();
        if conversations.len() < 2 {
            return;
        }
        let current = self
            .controller
            .active_conversation()
            .and_then(|active| conversations.iter().position(|c| c.id == active))
            .unwrap_or(0);
        let len = conversations.len();
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        if self.controller.switch_conversation(conversations[next].id) {
            self.reload_view();
            let title = conversations[next].title.clone();
            self.set_status(format!("Switched to \"{}\"", title), Severity::Info);
        }
    }

    /// Rebuild the chat pane from the stored transcript
    pub fn reload_view(&mut self) {
        self.chat_lines = self
            .controller
            .active_conversation()
            .and_then(|id| self.controller.snapshot(id))
            .map(|conversation| {
                conversation
                    .messages()
                    .iter()
                    .map(|m| {
                        let kind = match m.role() {
                            ChatRole::User => LineKind::User,
                            ChatRole::Assistant => LineKind::Assistant,
                            ChatRole::System => LineKind::Notice(Severity::Info),
                        };
                        ChatLine::new(kind, m.content())
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.scroll = 0;
        self.scroll_to_bottom();
    }

    pub fn clear_view(&mut self) {
        self.chat_lines.clear();
        self.scroll = 0;
    }

    pub fn toggle_streaming(&mut self) {
        let streaming = !self.controller.settings().streaming;
        self.controller.set_streaming(streaming);
        let text = if streaming { "Streaming on" } else { "Streaming off" };
        self.set_status(text, Severity::Info);
    }

    pub fn adjust_temperature(&mut self, up: bool) {
        let step = if up { TEMPERATURE_STEP } else { -TEMPERATURE_STEP };
        let next = ((self.controller.settings().temperature + step) * 10.0).round() / 10.0;
        self.controller.set_temperature(next);
        let temperature = self.controller.settings().temperature;
        self.set_status(format!("Temperature {:.1}", temperature), Severity::Info);
    }

    pub fn quit(&mut self) {
        self.controller.shutdown();
        self.should_quit = true;
    }

    // Scrolling
    fn total_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: usize = 0;
        for line in &self.chat_lines {
            total += 1; // role label
            for text in line.content.lines() {
                total += text.chars().count() / wrap_width + 1;
            }
            total += 1; // spacer
        }
        if self.is_busy() {
            total += 2;
        }
        total.min(u16::MAX as usize) as u16
    }

    fn max_scroll(&self) -> u16 {
        let visible = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_lines().saturating_sub(visible)
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    pub fn scroll_page_up(&mut self) {
        let page = self.chat_height.max(2) / 2;
        self.scroll = self.scroll.saturating_sub(page);
    }

    pub fn scroll_page_down(&mut self) {
        let page = self.chat_height.max(2) / 2;
        self.scroll = self.scroll.saturating_add(page).min(self.max_scroll());
    }

    pub fn scroll_lines_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_lines_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
    }
}
