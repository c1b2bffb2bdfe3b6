use courier_core::state_machine::LifecycleEvent;
use courier_core::storage::{MessageStorageMode, StorageOverrides};
use proptest::prelude::*;

pub fn lifecycle_event_strategy() -> impl Strategy<Value = LifecycleEvent> {
    prop_oneof![
        Just(LifecycleEvent::Start),
        Just(LifecycleEvent::StartCompleted),
        Just(LifecycleEvent::StartFailed),
        Just(LifecycleEvent::Stop),
        Just(LifecycleEvent::StopCompleted),
        Just(LifecycleEvent::Pause),
        Just(LifecycleEvent::PauseCompleted),
        Just(LifecycleEvent::PauseFailed),
        Just(LifecycleEvent::Resume),
        Just(LifecycleEvent::Halt),
        Just(LifecycleEvent::HaltCompleted),
    ]
}

pub fn storage_mode_strategy() -> impl Strategy<Value = MessageStorageMode> {
    prop::sample::select(MessageStorageMode::ALL.to_vec())
}

pub fn storage_overrides_strategy() -> impl Strategy<Value = StorageOverrides> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(remove_content_on_completion, remove_attachments_on_completion, store_attachments)| {
            StorageOverrides {
                remove_content_on_completion,
                remove_attachments_on_completion,
                store_attachments,
            }
        },
    )
}

/// Free-form message bodies, including segment separators and non-ASCII text
pub fn message_body_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9|^~&\\r\\n ]{0,64}",
        "\\PC{0,32}",
        Just(String::new()),
    ]
}
