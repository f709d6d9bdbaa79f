/// Kernel-level thread identifier of the thread a sample was taken on.
pub type ThreadId = i64;

/// Opaque method handle handed out by the unwinder. Never dereferenced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MethodId(pub u64);

/// One stack frame as produced by the unwinder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub instruction_offset: i32,
    pub method_id: MethodId,
}

impl FrameDescriptor {
    pub fn new(instruction_offset: i32, method_id: MethodId) -> Self {
        Self {
            instruction_offset,
            method_id,
        }
    }
}
