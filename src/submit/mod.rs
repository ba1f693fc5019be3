//! The two-level state machine: [`TaskSubmit`] owns a set of
//! [`SetSubmit`]s, one per test set of the submitted package.

mod set_submit;
mod task_submit;

pub use set_submit::{SetState, SetSubmit};
pub use task_submit::{TaskState, TaskSubmit};

/// Derives a set submit's registry id from its parent and set name.
///
/// This is a wire-level contract: the cluster callback URL embeds this
/// id verbatim, so the format (`"{task_submit_id}_{set_name}"`) must
/// stay stable.
pub fn make_set_submit_id(task_submit_id: &str, set_name: &str) -> String {
    format!("{task_submit_id}_{set_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_submit_id_is_injective_over_distinct_pairs() {
        let pairs = [
            ("task-a", "set-1"),
            ("task-a", "set-2"),
            ("task-b", "set-1"),
        ];
        let mut ids: Vec<String> = pairs
            .iter()
            .map(|(t, s)| make_set_submit_id(t, s))
            .collect();
        let original_len = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), original_len);
    }
}
