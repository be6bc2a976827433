use core_types::{CoreError, CoreResult, DerivedRates, EarlySignalSample};

/// Checks counter shape and derives CTR, bounce rate and CVR.
///
/// Zero denominators are not errors: the rate comes back as `None` and
/// `insufficient_data` is raised so the scorer can lower its confidence.
pub fn derive_rates(sample: &EarlySignalSample) -> CoreResult<DerivedRates> {
    let counters = [
        ("impressions", sample.impressions),
        ("clicks", sample.clicks),
        ("landing_views", sample.landing_views),
        ("landing_bounces", sample.landing_bounces),
        ("conversions", sample.conversions),
    ];
    for (field, value) in counters {
        if value < 0 {
            return Err(CoreError::validation(field, format!("negative counter {value}")));
        }
    }

    if !sample.avg_time_on_page.is_finite() || sample.avg_time_on_page < 0.0 {
        return Err(CoreError::validation(
            "avg_time_on_page",
            format!("expected finite seconds >= 0, got {}", sample.avg_time_on_page),
        ));
    }
    if let Some(hours) = sample.window_hours {
        if !hours.is_finite() || hours < 0.0 {
            return Err(CoreError::validation(
                "window_hours",
                format!("expected finite hours >= 0, got {hours}"),
            ));
        }
    }

    ensure_not_above("clicks", sample.clicks, "impressions", sample.impressions)?;
    ensure_not_above("landing_views", sample.landing_views, "clicks", sample.clicks)?;
    ensure_not_above(
        "landing_bounces",
        sample.landing_bounces,
        "landing_views",
        sample.landing_views,
    )?;
    ensure_not_above(
        "conversions",
        sample.conversions,
        "landing_views",
        sample.landing_views,
    )?;

    let ctr = ratio(sample.clicks, sample.impressions);
    let bounce_rate = ratio(sample.landing_bounces, sample.landing_views);
    let cvr = ratio(sample.conversions, sample.landing_views);

    Ok(DerivedRates {
        ctr,
        bounce_rate,
        cvr,
        insufficient_data: sample.impressions == 0 || sample.landing_views == 0,
    })
}

fn ensure_not_above(
    field: &'static str,
    value: i64,
    bound_name: &str,
    bound: i64,
) -> CoreResult<()> {
    if value > bound {
        return Err(CoreError::validation(
            field,
            format!("{value} exceeds {bound_name} ({bound})"),
        ));
    }
    Ok(())
}

fn ratio(num: i64, den: i64) -> Option<f64> {
    if den <= 0 {
        return None;
    }
    Some((num as f64 / den as f64).clamp(0.0, 1.0))
}
