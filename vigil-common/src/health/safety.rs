//! Data-safety evaluation.

use super::state::ResourceState;
use crate::types::BackendKind;

/// Whether destructive recovery on a resource in `state` keeps the user's work.
///
/// Unsafe when storage is already gone (`DataLost`, `WorktreeMissing`), or when
/// a VM that destroys its disk on stop is no longer running. A hibernated VM
/// keeps its disk and stays safe. A failed resource on an unsupported backend
/// is unsafe since nothing is known about where its data lives.
pub fn is_data_safe(kind: BackendKind, state: &ResourceState, destroy_on_stop: bool) -> bool {
    match state {
        ResourceState::DataLost { .. } | ResourceState::WorktreeMissing => false,
        ResourceState::Stopped | ResourceState::Error { .. } | ResourceState::CrashLoop => {
            let storage_unknown = kind == BackendKind::Unsupported;
            !(storage_unknown || (kind == BackendKind::Vm && destroy_on_stop))
        }
        ResourceState::Healthy
        | ResourceState::Hibernated
        | ResourceState::Pending
        | ResourceState::Missing
        | ResourceState::DeletedExternally => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_loss_is_never_safe() {
        for kind in BackendKind::ALL {
            for flag in [false, true] {
                assert!(!is_data_safe(
                    kind,
                    &ResourceState::DataLost {
                        reason: "gone".to_string()
                    },
                    flag
                ));
                assert!(!is_data_safe(kind, &ResourceState::WorktreeMissing, flag));
            }
        }
    }

    #[test]
    fn test_destroy_on_stop_only_affects_vm() {
        let stopped = ResourceState::Stopped;
        assert!(!is_data_safe(BackendKind::Vm, &stopped, true));
        assert!(is_data_safe(BackendKind::Vm, &stopped, false));
        assert!(is_data_safe(BackendKind::Container, &stopped, true));
        assert!(is_data_safe(BackendKind::Pod, &ResourceState::CrashLoop, true));
    }

    #[test]
    fn test_unsupported_backend_failures_are_unsafe() {
        let error = ResourceState::Error {
            message: "no adapter".to_string(),
        };
        assert!(!is_data_safe(BackendKind::Unsupported, &error, false));
        assert!(!is_data_safe(BackendKind::Unsupported, &ResourceState::Stopped, false));
        assert!(is_data_safe(BackendKind::Unsupported, &ResourceState::Healthy, false));
    }

    #[test]
    fn test_hibernated_vm_is_exempt() {
        assert!(is_data_safe(BackendKind::Vm, &ResourceState::Hibernated, true));
    }

    #[test]
    fn test_vm_error_with_destroy_flag() {
        let error = ResourceState::Error {
            message: "kernel panic".to_string(),
        };
        assert!(!is_data_safe(BackendKind::Vm, &error, true));
        assert!(is_data_safe(BackendKind::Vm, &error, false));
    }
}
