use chrono::NaiveDate;

use crate::models::LogEntryView;

pub const CSV_HEADER: [&str; 10] = [
    "timestamp",
    "reagent",
    "lot",
    "action",
    "user",
    "unit",
    "quantity_before",
    "quantity_after",
    "quantity_changed",
    "notes",
];

/// RFC 4180: quote fields holding a comma, quote, CR or LF; double inner quotes.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row(fields: &[String]) -> String {
    fields.iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn render_csv(entries: &[LogEntryView]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADER.join(","));
    out.push_str("\r\n");

    for entry in entries {
        let fields = [
            entry.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
            entry.reagent_name.clone().unwrap_or_default(),
            entry.lot_number.clone().unwrap_or_default(),
            entry.action_type.clone(),
            entry.user_name.clone().or_else(|| entry.user_id.clone()).unwrap_or_default(),
            entry.unit_name.clone().unwrap_or_default(),
            entry.quantity_before.to_string(),
            entry.quantity_after.to_string(),
            entry.quantity_changed.to_string(),
            entry.notes.clone().unwrap_or_default(),
        ];
        out.push_str(&row(&fields));
        out.push_str("\r\n");
    }
    out
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("consumption-logs-{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn entry(notes: &str) -> LogEntryView {
        LogEntryView {
            id: Uuid::new_v4(),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 20, 14, 30, 0).unwrap()),
            action_type: "consume".to_string(),
            reagent_lot_id: Uuid::new_v4(),
            reagent_name: Some("Glucose Oxidase".to_string()),
            lot_number: Some("LOT2024001".to_string()),
            unit_id: None,
            unit_name: Some("Central Lab".to_string()),
            user_id: Some("u1".to_string()),
            user_name: Some("Joao Silva".to_string()),
            quantity_before: 80.0,
            quantity_after: 75.0,
            quantity_changed: 5.0,
            appointment_id: None,
            points_awarded: Some(5),
            notes: Some(notes.to_string()),
        }
    }

    #[test]
    fn plain_fields_are_left_alone() {
        assert_eq!(escape_field("LOT2024001"), "LOT2024001");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn quotes_commas_and_newlines_are_escaped() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_field("cr\rhere"), "\"cr\rhere\"");
    }

    #[test]
    fn renders_header_and_rows() {
        let csv = render_csv(&[entry("Glycemia exam, patient \"M\"")]);
        let lines: Vec<&str> = csv.split("\r\n").collect();

        assert_eq!(lines[0], "timestamp,reagent,lot,action,user,unit,quantity_before,quantity_after,quantity_changed,notes");
        assert_eq!(
            lines[1],
            "2024-01-20T14:30:00+00:00,Glucose Oxidase,LOT2024001,consume,Joao Silva,Central Lab,80,75,5,\"Glycemia exam, patient \"\"M\"\"\""
        );
        assert_eq!(lines[2], "");
    }

    #[test]
    fn falls_back_to_user_id() {
        let mut anonymous = entry("x");
        anonymous.user_name = None;
        let csv = render_csv(&[anonymous]);
        assert!(csv.contains(",consume,u1,"));
    }

    #[test]
    fn filename_carries_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_filename(date), "consumption-logs-2024-03-09.csv");
    }
}
