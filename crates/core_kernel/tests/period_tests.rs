//! Tests for billing periods

use core_kernel::{BillingPeriod, PeriodError, Timezone};

fn period(month: u32, year: i32) -> BillingPeriod {
    BillingPeriod::new(month, year).unwrap()
}

#[test]
fn test_adjacency_within_year() {
    assert!(period(2, 2024).is_followed_by(&period(3, 2024)));
    assert!(!period(2, 2024).is_followed_by(&period(4, 2024)));
    assert!(!period(3, 2024).is_followed_by(&period(2, 2024)));
}

#[test]
fn test_adjacency_across_year_boundary() {
    assert!(period(12, 2023).is_followed_by(&period(1, 2024)));
    assert!(!period(12, 2023).is_followed_by(&period(1, 2023)));
}

#[test]
fn test_ordinal_distance() {
    assert_eq!(period(1, 2024).ordinal() - period(11, 2023).ordinal(), 2);
}

#[test]
fn test_display() {
    assert_eq!(period(3, 2024).to_string(), "03/2024");
}

#[test]
fn test_invalid_year() {
    assert_eq!(BillingPeriod::new(1, 1800), Err(PeriodError::InvalidYear(1800)));
}

#[test]
fn test_timezone_parse_and_serde() {
    let tz = Timezone::parse("Asia/Ho_Chi_Minh").unwrap();
    assert_eq!(tz, Timezone::default());

    let json = serde_json::to_string(&tz).unwrap();
    assert_eq!(json, "\"Asia/Ho_Chi_Minh\"");

    assert!(matches!(Timezone::parse("Mars/Olympus"), Err(PeriodError::InvalidTimezone(_))));
}

#[test]
fn test_period_serde_roundtrip_shape() {
    let json = serde_json::to_value(period(5, 2024)).unwrap();
    assert_eq!(json["month"], 5);
    assert_eq!(json["year"], 2024);
}
