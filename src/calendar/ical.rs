//! iCalendar documents for Apple Calendar and the full `.ics` export.

use icalendar::{Calendar, Component, EventLike};

use super::CalendarEventData;
use crate::models::Event;

pub const CALENDAR_NAME: &str = "Sam Hébert - Événements";
const CALENDAR_DESCRIPTION: &str = "Calendrier des spectacles de Sam Hébert";

fn vevent(data: &CalendarEventData, uid: &str) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();
    ics_event
        .uid(uid)
        .summary(&data.title)
        .description(&data.description)
        .location(&data.location)
        .starts(data.start)
        .ends(data.end);
    ics_event
}

/// A one-event calendar, as handed to Apple Calendar for a single sync.
pub fn single_event_document(data: &CalendarEventData, uid: &str) -> String {
    let mut cal = Calendar::new();
    cal.name(CALENDAR_NAME);
    cal.push(vevent(data, uid).done());
    cal.done().to_string()
}

/// One VEVENT per event, keyed by the event id so re-imports replace earlier copies.
pub fn full_export(events: &[Event]) -> String {
    let mut cal = Calendar::new();
    cal.name(CALENDAR_NAME);
    cal.description(CALENDAR_DESCRIPTION);

    for event in events {
        let data = CalendarEventData::from_event(event);
        let mut ics_event = vevent(&data, &event.id.to_string());
        ics_event.add_property("CREATED", event.created_at.format("%Y%m%dT%H%M%SZ").to_string());
        ics_event.add_property(
            "LAST-MODIFIED",
            event.updated_at.format("%Y%m%dT%H%M%SZ").to_string(),
        );
        cal.push(ics_event.done());
    }

    cal.done().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn sample_event(title: &str, day: u32) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            venue_name: "Le Bordel".into(),
            description: None,
            date: NaiveDate::from_ymd_opt(2025, 9, day).unwrap(),
            venue: "Le Bordel, 312 Ontario E, Montréal, QC".into(),
            city: "Montréal".into(),
            tickets_url: None,
            add_to_calendar: true,
            publish_to_website: true,
            send_notification: false,
            status: EventStatus::Published,
            calendar_event_id: None,
            microsoft_event_id: None,
            apple_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn single_document_uses_given_uid() {
        let event = sample_event("Soirée du rire", 20);
        let data = CalendarEventData::from_event(&event);
        let ics = single_event_document(&data, "evt-123");

        assert!(ics.starts_with("BEGIN:VCALENDAR"));
        assert!(ics.contains("UID:evt-123"));
        assert!(ics.contains("SUMMARY:Soirée du rire"));
        assert!(ics.contains("DTSTART:20250920T000000Z"));
        assert!(ics.contains("DTEND:20250920T020000Z"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
    }

    #[test]
    fn empty_export_is_still_a_calendar() {
        let ics = full_export(&[]);
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("END:VCALENDAR"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn export_has_one_vevent_per_event(days in proptest::collection::vec(1u32..=28, 0..20)) {
            let events: Vec<Event> = days
                .iter()
                .enumerate()
                .map(|(i, day)| sample_event(&format!("Spectacle {}", i), *day))
                .collect();

            let ics = full_export(&events);
            prop_assert_eq!(ics.matches("BEGIN:VEVENT").count(), events.len());
            for event in &events {
                let uid = format!("UID:{}", event.id);
                prop_assert!(ics.contains(&uid));
            }
        }
    }
}
