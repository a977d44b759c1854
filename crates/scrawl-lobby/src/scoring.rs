//! Points for correct guesses and for the drawer.

use crate::config::ScoreRules;

/// Points for one correct guess.
///
/// - `elapsed` is the fraction (0.0–1.0) of the drawing time already used.
/// - `order` is how many players guessed correctly before this one.
/// - `already_awarded` is what earlier guessers of this turn earned; the
///   result never pushes the turn's total past `rules.pool`.
pub fn guesser_points(
    rules: &ScoreRules,
    elapsed: f64,
    hints_left: u32,
    hint_count: u32,
    order: u32,
    already_awarded: u32,
) -> u32 {
    let elapsed = elapsed.clamp(0.0, 1.0);
    let time_part = rules.base * (1.0 - rules.time_decay * elapsed);
    let hint_part = if hint_count == 0 {
        rules.hint_bonus
    } else {
        rules.hint_bonus * f64::from(hints_left.min(hint_count)) / f64::from(hint_count)
    };
    let raw = (time_part + hint_part) * rules.order_decay.powi(order as i32);
    let points = raw.round().max(0.0) as u32;
    points.min(rules.pool.saturating_sub(already_awarded))
}

/// The drawer's share: the average of what the guessers earned.
pub fn drawer_points(total_awarded: u32, guessers: u32) -> u32 {
    if guessers == 0 {
        0
    } else {
        total_awarded / guessers
    }
}
