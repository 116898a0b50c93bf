use super::types::{ChatMessage, Exchange, ExchangeId, Sender};

/// Ordered list of exchanges for the active conversation
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    exchanges: Vec<Exchange>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn get(&self, id: ExchangeId) -> Option<&Exchange> {
        self.exchanges.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: ExchangeId) -> Option<&mut Exchange> {
        self.exchanges.iter_mut().find(|e| e.id == id)
    }

    /// The exchange still waiting for an answer, if any
    pub fn pending(&self) -> Option<&Exchange> {
        self.exchanges.iter().find(|e| e.state.is_pending())
    }

    pub fn pending_count(&self) -> usize {
        self.exchanges.iter().filter(|e| e.state.is_pending()).count()
    }

    /// Drop every exchange that has not resolved yet
    pub fn discard_pending(&mut self) -> usize {
        let before = self.exchanges.len();
        self.exchanges.retain(|e| !e.state.is_pending());
        before - self.exchanges.len()
    }

    pub fn replace(&mut self, exchanges: Vec<Exchange>) {
        self.exchanges = exchanges;
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Flatten into display messages: the question, then the answer once
    /// the exchange has resolved. Pending exchanges render only the question;
    /// their progress is shown by the typing indicator instead.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.exchanges.len() * 2);
        for exchange in &self.exchanges {
            messages.push(ChatMessage {
                exchange_id: exchange.id,
                sender: Sender::User,
                text: exchange.question.clone(),
                timestamp: exchange.created_at,
                is_error: false,
                audio: None,
            });
            if let Some(answer) = exchange.answer.as_ref().filter(|_| exchange.state.is_terminal()) {
                messages.push(ChatMessage {
                    exchange_id: exchange.id,
                    sender: Sender::Assistant,
                    text: answer.clone(),
                    timestamp: exchange.created_at,
                    is_error: exchange.is_error,
                    audio: exchange.audio.clone(),
                });
            }
        }
        messages
    }
}
