#![no_main]
use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(range) = input.parse::<ekz_tesla::tariff::TimeRange>() else {
        return;
    };

    // Accepted ranges must round-trip through their display form
    let reparsed: ekz_tesla::tariff::TimeRange = range.to_string().parse().expect("reparse");
    assert_eq!(range, reparsed);

    if let Some(at) = NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)) {
        let schedule = ekz_tesla::tariff::TariffSchedule::new(vec![range], None);
        let next = schedule.next_low_tariff(at);
        assert!(next >= at);
    }
});
