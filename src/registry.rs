//! The process-wide registry (DataMaster): owns every live `TaskSubmit`
//! and `SetSubmit`, keyed by id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::RegistryError;
use crate::submit::{make_set_submit_id, SetSubmit, TaskSubmit};

#[derive(Default)]
struct Maps {
    task_submits: HashMap<String, Arc<TaskSubmit>>,
    set_submits: HashMap<String, Arc<SetSubmit>>,
}

/// Holds the registry's two maps. Operations never await while the
/// inner `std::sync::Mutex` is held, so this is a plain sync mutex
/// rather than `tokio::sync::Mutex`.
pub struct Registry {
    maps: Mutex<Maps>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
        }
    }

    pub fn new_task_submit(
        &self,
        task_submit_id: &str,
        package_path: PathBuf,
        commit_id: String,
        solution_path: PathBuf,
    ) -> Result<Arc<TaskSubmit>, RegistryError> {
        let mut maps = self.maps.lock().expect("registry mutex poisoned");
        if maps.task_submits.contains_key(task_submit_id) {
            return Err(RegistryError::TaskAlreadyExists(task_submit_id.to_string()));
        }
        let task_submit = Arc::new(TaskSubmit::new(
            task_submit_id.to_string(),
            package_path,
            commit_id,
            solution_path,
        ));
        maps.task_submits
            .insert(task_submit_id.to_string(), task_submit.clone());
        Ok(task_submit)
    }

    pub fn new_set_submit(
        &self,
        task_submit_id: &str,
        set_name: &str,
    ) -> Result<Arc<SetSubmit>, RegistryError> {
        let set_submit_id = make_set_submit_id(task_submit_id, set_name);
        let mut maps = self.maps.lock().expect("registry mutex poisoned");
        if maps.set_submits.contains_key(&set_submit_id) {
            return Err(RegistryError::SetAlreadyExists(set_submit_id));
        }
        let set_submit = Arc::new(SetSubmit::new(
            set_submit_id.clone(),
            task_submit_id.to_string(),
            set_name.to_string(),
        ));
        maps.set_submits.insert(set_submit_id, set_submit.clone());
        Ok(set_submit)
    }

    pub fn get_task_submit(&self, submit_id: &str) -> Result<Arc<TaskSubmit>, RegistryError> {
        let maps = self.maps.lock().expect("registry mutex poisoned");
        maps.task_submits
            .get(submit_id)
            .cloned()
            .ok_or_else(|| RegistryError::TaskNotFound(submit_id.to_string()))
    }

    pub fn get_set_submit(&self, submit_id: &str) -> Result<Arc<SetSubmit>, RegistryError> {
        let maps = self.maps.lock().expect("registry mutex poisoned");
        maps.set_submits
            .get(submit_id)
            .cloned()
            .ok_or_else(|| RegistryError::SetNotFound(submit_id.to_string()))
    }

    /// All task submit ids currently registered; used by the janitor to
    /// snapshot candidates outside this mutex before trashing any of
    /// them.
    pub fn task_submit_ids(&self) -> Vec<String> {
        let maps = self.maps.lock().expect("registry mutex poisoned");
        maps.task_submits.keys().cloned().collect()
    }

    /// Removes a task submit and all of its children. Idempotent from
    /// the orchestrator's standpoint: callers on the trash path first
    /// check presence via `get_task_submit` before calling this, so a
    /// stray second call only happens if the same task races itself,
    /// which the per-task mutex prevents.
    pub fn delete_task_submit(
        &self,
        task_submit: &TaskSubmit,
        set_names: &[String],
    ) -> Result<(), RegistryError> {
        let mut maps = self.maps.lock().expect("registry mutex poisoned");
        if !maps.task_submits.contains_key(&task_submit.submit_id) {
            return Err(RegistryError::TaskNotFound(task_submit.submit_id.clone()));
        }
        for set_name in set_names {
            let set_id = make_set_submit_id(&task_submit.submit_id, set_name);
            maps.set_submits.remove(&set_id);
        }
        maps.task_submits.remove(&task_submit.submit_id);
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_submit_collision_is_rejected() {
        let registry = Registry::new();
        registry
            .new_task_submit("t1", "/pkg".into(), "abc".into(), "/sol".into())
            .unwrap();
        let err = registry.new_task_submit("t1", "/pkg".into(), "abc".into(), "/sol".into());
        assert!(matches!(err, Err(RegistryError::TaskAlreadyExists(_))));
    }

    #[test]
    fn delete_removes_task_and_children() {
        let registry = Registry::new();
        let task = registry
            .new_task_submit("t1", "/pkg".into(), "abc".into(), "/sol".into())
            .unwrap();
        registry.new_set_submit("t1", "set1").unwrap();

        registry
            .delete_task_submit(&task, &["set1".to_string()])
            .unwrap();

        assert!(registry.get_task_submit("t1").is_err());
        assert!(registry.get_set_submit("t1_set1").is_err());
    }

    #[test]
    fn double_delete_fails() {
        let registry = Registry::new();
        let task = registry
            .new_task_submit("t1", "/pkg".into(), "abc".into(), "/sol".into())
            .unwrap();
        registry.delete_task_submit(&task, &[]).unwrap();
        assert!(registry.delete_task_submit(&task, &[]).is_err());
    }
}
