use std::time::Instant;

use super::error::Rejection;
use super::event::ServerEvent;
use super::participant::ConnId;
use super::room::Role;
use super::{now_millis, Hub};

/// Escapes angle brackets. Not a full HTML sanitizer.
pub fn sanitize(input: &str) -> String {
    input.replace('<', "&lt;").replace('>', "&gt;")
}

pub fn truncate_chars(input: &str, max: usize) -> &str {
    match input.char_indices().nth(max) {
        Some((end, _)) => &input[..end],
        None => input,
    }
}

impl Hub {
    pub fn send_message(&mut self, id: ConnId, text: &str, now: Instant) {
        let (window, max) = (self.limits.rate_window, self.limits.rate_max);
        let Some(sender) = self.participants.get_mut(&id) else {
            return;
        };

        if !sender.rate.allow(now, window, max) {
            self.reject(id, Rejection::RateLimited);
            return;
        }

        let Some(partner) = sender.partner else {
            self.reject(id, Rejection::NoActivePartner);
            return;
        };
        let room_id = sender.room.clone();

        let clean = sanitize(truncate_chars(text, self.limits.message_chars));
        let ts = now_millis();

        if let Some(room) = room_id.and_then(|room_id| self.rooms.get_mut(&room_id)) {
            room.push_message(id, &clean, ts);
        }

        self.emit(partner, ServerEvent::Message { from: Role::Other, text: clean.clone(), ts });
        self.emit(id, ServerEvent::Message { from: Role::Own, text: clean, ts });
    }

    pub fn send_typing(&self, id: ConnId, is_typing: bool) {
        if let Some(partner) = self.partner(id) {
            self.emit(partner, ServerEvent::Typing { is_typing });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_escapes_only_angle_brackets() {
        assert_eq!(sanitize("<b>hi</b> & \"x\""), "&lt;b&gt;hi&lt;/b&gt; & \"x\"");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("გამარჯობა", 3), "გამ");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }
}
