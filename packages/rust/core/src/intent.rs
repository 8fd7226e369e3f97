//! Booking-intent detection by keyword.

/// Case-insensitive keyword matcher over whole words.
///
/// A keyword may span several words (`"free slot"`); it matches when the
/// same word sequence appears in the query. A trailing plural `s` on a query
/// word is tolerated.
#[derive(Debug, Clone)]
pub struct BookingIntent {
    keywords: Vec<Vec<String>>,
}

impl BookingIntent {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| words(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Whether `query` asks about booking.
    pub fn matches(&self, query: &str) -> bool {
        let query = words(query);
        self.keywords.iter().any(|keyword| {
            query.windows(keyword.len()).any(|window| {
                window
                    .iter()
                    .zip(keyword)
                    .all(|(q, k)| q == k || q.strip_suffix('s') == Some(k.as_str()))
            })
        })
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitedesk_shared::AppConfig;

    fn default_intent() -> BookingIntent {
        BookingIntent::new(&AppConfig::default().grounding.booking_keywords)
    }

    #[test]
    fn detects_booking_questions() {
        let intent = default_intent();
        assert!(intent.matches("Can I book a meeting next week?"));
        assert!(intent.matches("Any APPOINTMENTS on Friday?"));
        assert!(intent.matches("Do you have a free slot tomorrow?"));
        assert!(intent.matches("What's your availability?"));
    }

    #[test]
    fn ignores_other_questions() {
        let intent = default_intent();
        assert!(!intent.matches("Do you install fiber cabling?"));
        assert!(!intent.matches("Is there a Facebook page?"));
        assert!(!intent.matches("free shipping on slots of cable"));
        assert!(!intent.matches(""));
    }

    #[test]
    fn blank_keywords_never_match() {
        let intent = BookingIntent::new(&["", "  "]);
        assert!(!intent.matches("book a meeting"));
    }
}
