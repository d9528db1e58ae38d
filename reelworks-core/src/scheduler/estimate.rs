//! Per-video credit cost estimation.

/// Estimated credits for processing one video. Short clips pay a flat
/// floor of 2 credits; everything else pays one credit per started
/// minute.
pub fn video_credit_cost(duration_secs: u64) -> i64 {
    if duration_secs < 60 {
        2
    } else {
        duration_secs.div_ceil(60) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_clips_pay_the_floor() {
        assert_eq!(video_credit_cost(0), 2);
        assert_eq!(video_credit_cost(1), 2);
        assert_eq!(video_credit_cost(59), 2);
    }

    #[test]
    fn minute_boundaries_round_up() {
        assert_eq!(video_credit_cost(60), 1);
        assert_eq!(video_credit_cost(61), 2);
        assert_eq!(video_credit_cost(120), 2);
        assert_eq!(video_credit_cost(121), 3);
        assert_eq!(video_credit_cost(3600), 60);
    }
}
