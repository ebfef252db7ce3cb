/// How an event was held, derived from venue/address text. Rendered with the
/// source site's own labels so stored rows match what connpass shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    Onsite,
    Online,
    Hybrid,
    Undetermined,
}

impl EventMode {
    pub fn label(self) -> &'static str {
        match self {
            EventMode::Onsite => "対面",
            EventMode::Online => "オンライン",
            EventMode::Hybrid => "オンライン / 対面",
            EventMode::Undetermined => "未定",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "対面" => Some(EventMode::Onsite),
            "オンライン" => Some(EventMode::Online),
            "オンライン / 対面" => Some(EventMode::Hybrid),
            "未定" => Some(EventMode::Undetermined),
            _ => None,
        }
    }
}

/// A parsed-but-not-yet-persisted event. `links` holds every normalized
/// candidate URL found on the page, in first-seen order, before
/// classification. An unknown participant count exists only inside the
/// parser; a draft that reaches callers always carries a settled number.
#[derive(Debug, Clone)]
pub struct DraftRecord {
    pub vol: String,
    pub event_type: String,
    pub title: String,
    pub mode: EventMode,
    pub venue_name: String,
    pub address: String,
    pub source_url: String,
    pub links: Vec<String>,
    pub participants: u32,
    pub date: String,
    pub weekday: String,
    pub time_range: String,
}

/// One finalized row of the store, minus its id. Ids are assigned by the
/// store at append time so numbering stays contiguous across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub vol: String,
    pub event_type: String,
    pub title: String,
    pub mode: EventMode,
    pub venue_name: String,
    pub address: String,
    pub source_url: String,
    pub tweet_urls: Vec<String>,
    pub slide_urls: Vec<String>,
    pub participants: u32,
    pub date: String,
    pub weekday: String,
    pub time_range: String,
}

impl DraftRecord {
    /// Finalize a draft once its links are classified.
    pub fn into_record(self, tweet_urls: Vec<String>, slide_urls: Vec<String>) -> EventRecord {
        EventRecord {
            vol: self.vol,
            event_type: self.event_type,
            title: self.title,
            mode: self.mode,
            venue_name: self.venue_name,
            address: self.address,
            source_url: self.source_url,
            tweet_urls,
            slide_urls,
            participants: self.participants,
            date: self.date,
            weekday: self.weekday,
            time_range: self.time_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_labels_round_trip() {
        for mode in [
            EventMode::Onsite,
            EventMode::Online,
            EventMode::Hybrid,
            EventMode::Undetermined,
        ] {
            assert_eq!(EventMode::from_label(mode.label()), Some(mode));
        }
        assert_eq!(EventMode::from_label("somewhere"), None);
    }
}
