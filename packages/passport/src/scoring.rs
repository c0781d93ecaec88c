//! Pure exposure scoring: pollutant readings in, score/tier/tips out.
//!
//! The score is a weighted linear penalty against a baseline of 100,
//! clamped to [0, 100]. Missing readings contribute no penalty and are
//! treated as absent, not as zero: no tip ever claims a pollutant is safe
//! when its value was never supplied.

use haze_map_passport_models::{PollutantReadings, RiskLevel, ScoreBreakdown};

/// Perfect-air baseline the penalties subtract from.
const BASELINE: f64 = 100.0;

/// Penalty divisor for PM2.5 (µg/m³).
const PM25_DIVISOR: f64 = 2.0;
/// Penalty divisor for NO₂ (µg/m³).
const NO2_DIVISOR: f64 = 2.5;
/// Penalty multiplier for CO (ppm).
const CO_MULTIPLIER: f64 = 8.0;

/// 24-hour PM2.5 guideline (µg/m³); crossing it fires the mask tip.
const PM25_GUIDELINE: f64 = 35.0;
/// PM2.5 level where sensitive groups should start taking care.
const PM25_ELEVATED: f64 = 12.0;
/// Annual NO₂ guideline (µg/m³).
const NO2_GUIDELINE: f64 = 40.0;
/// 8-hour CO guideline (ppm).
const CO_GUIDELINE: f64 = 9.0;

/// Scores one set of readings.
///
/// Deterministic: identical inputs always produce the identical score,
/// tier, and tip list (tips are emitted in fixed threshold order).
#[must_use]
pub fn score_exposure(readings: &PollutantReadings) -> ScoreBreakdown {
    let penalty = readings.pm25.unwrap_or(0.0) / PM25_DIVISOR
        + readings.no2.unwrap_or(0.0) / NO2_DIVISOR
        + readings.co.unwrap_or(0.0) * CO_MULTIPLIER;
    let score = (BASELINE - penalty).clamp(0.0, 100.0);
    let risk_level = RiskLevel::from_score(score);

    ScoreBreakdown {
        score,
        risk_level,
        tips: tips_for(readings, risk_level),
    }
}

/// Builds the ordered tip list for crossed thresholds.
fn tips_for(readings: &PollutantReadings, risk_level: RiskLevel) -> Vec<String> {
    let mut tips = Vec::new();

    if let Some(pm25) = readings.pm25 {
        if pm25 > PM25_GUIDELINE {
            tips.push(
                "PM2.5 is high: wear an N95 mask outdoors and keep strenuous activity short."
                    .to_string(),
            );
        } else if pm25 > PM25_ELEVATED {
            tips.push(
                "PM2.5 is elevated: sensitive groups should limit prolonged outdoor exertion."
                    .to_string(),
            );
        }
    }

    if let Some(no2) = readings.no2
        && no2 > NO2_GUIDELINE
    {
        tips.push(
            "NO2 is above guideline levels: avoid lingering near heavy traffic.".to_string(),
        );
    }

    if let Some(co) = readings.co
        && co > CO_GUIDELINE
    {
        tips.push(
            "CO is above guideline levels: move to fresh air and ventilate enclosed spaces."
                .to_string(),
        );
    }

    if risk_level == RiskLevel::High {
        tips.push("Air quality is poor right now: consider indoor activities today.".to_string());
    }

    if readings.is_empty() {
        tips.push(
            "No pollutant readings were supplied: log nearby station readings to build your insights."
                .to_string(),
        );
    } else if tips.is_empty() && risk_level == RiskLevel::Low {
        tips.push("Readings look good: a fine time to be outdoors.".to_string());
    }

    tips
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(pm25: Option<f64>, no2: Option<f64>, co: Option<f64>) -> PollutantReadings {
        PollutantReadings { pm25, no2, co }
    }

    #[test]
    fn weighted_penalty_against_baseline() {
        let breakdown = score_exposure(&readings(Some(20.0), Some(25.0), Some(1.0)));
        // 100 - (20/2 + 25/2.5 + 1*8) = 72
        assert!((breakdown.score - 72.0).abs() < 1e-9);
        assert_eq!(breakdown.risk_level, RiskLevel::Moderate);
    }

    #[test]
    fn score_clamps_to_zero() {
        let breakdown = score_exposure(&readings(Some(500.0), Some(300.0), Some(40.0)));
        assert!((breakdown.score - 0.0).abs() < f64::EPSILON);
        assert_eq!(breakdown.risk_level, RiskLevel::High);
    }

    #[test]
    fn missing_readings_contribute_no_penalty() {
        let breakdown = score_exposure(&readings(None, None, Some(1.0)));
        assert!((breakdown.score - 92.0).abs() < 1e-9);
        assert_eq!(breakdown.risk_level, RiskLevel::Low);
    }

    #[test]
    fn identical_inputs_identical_output() {
        let input = readings(Some(55.0), Some(60.0), None);
        let a = score_exposure(&input);
        let b = score_exposure(&input);
        assert_eq!(a, b);
    }

    #[test]
    fn tips_fire_in_threshold_order() {
        let breakdown = score_exposure(&readings(Some(80.0), Some(90.0), Some(12.0)));
        assert_eq!(breakdown.risk_level, RiskLevel::High);
        assert_eq!(breakdown.tips.len(), 4);
        assert!(breakdown.tips[0].starts_with("PM2.5 is high"));
        assert!(breakdown.tips[1].starts_with("NO2"));
        assert!(breakdown.tips[2].starts_with("CO"));
        assert!(breakdown.tips[3].starts_with("Air quality is poor"));
    }

    #[test]
    fn elevated_pm25_gets_the_softer_tip() {
        let breakdown = score_exposure(&readings(Some(20.0), None, None));
        assert_eq!(breakdown.tips.len(), 1);
        assert!(breakdown.tips[0].starts_with("PM2.5 is elevated"));
    }

    #[test]
    fn no_tip_claims_safety_for_unsupplied_pollutants() {
        let breakdown = score_exposure(&readings(None, None, None));
        assert!((breakdown.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(breakdown.tips.len(), 1);
        assert!(breakdown.tips[0].starts_with("No pollutant readings"));
    }

    #[test]
    fn clean_supplied_readings_get_the_good_day_tip() {
        let breakdown = score_exposure(&readings(Some(5.0), Some(8.0), Some(0.2)));
        assert_eq!(breakdown.risk_level, RiskLevel::Low);
        assert_eq!(breakdown.tips.len(), 1);
        assert!(breakdown.tips[0].starts_with("Readings look good"));
    }
}
