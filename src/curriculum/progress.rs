use serde::Serialize;

use super::document::WeekRecord;
use crate::utils::percent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub weeks: Vec<WeekRecord>,
    pub completed_modules: i64,
    pub progress_percent: i64,
}

/// Spread `completed_count` over the weeks in curriculum order.
///
/// Completions are not attributed to a particular week; the count fills the
/// first week up to its `module_count`, then the second, and so on. Only the
/// total matters, so the result is the same whichever content the learner
/// actually finished.
pub fn reduce(weeks: &[WeekRecord], total_modules: i64, completed_count: i64) -> Progress {
    let completed_modules = completed_count.clamp(0, total_modules.max(0));
    let mut allocated_so_far = 0;
    let weeks = weeks
        .iter()
        .map(|week| {
            let module_count = week.module_count.max(0);
            let in_this_week = completed_modules
                .saturating_sub(allocated_so_far)
                .clamp(0, module_count);
            allocated_so_far = allocated_so_far.saturating_add(module_count);
            WeekRecord {
                completed_modules: in_this_week,
                progress_percent: percent(in_this_week, module_count),
                ..week.clone()
            }
        })
        .collect();
    Progress {
        weeks,
        completed_modules,
        progress_percent: percent(completed_modules, total_modules),
    }
}
