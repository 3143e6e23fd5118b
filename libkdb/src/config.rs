/// Which words at the top of a thread control block belong to the user
/// entry frame. The layout is architecture specific, so it is handed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Number of words directly below the end of the block.
    pub user_frame_words: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        // ip, cs, flags, sp, ss
        FrameLayout { user_frame_words: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    pub screen_height: usize,
    /// Space at the top level returns to the prompt instead of being looked
    /// up as a command.
    pub space_is_idle: bool,
    pub frame_layout: FrameLayout,
    /// Bytes shown per viewer row.
    pub row_bytes: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        DebuggerConfig {
            screen_height: 25,
            space_is_idle: false,
            frame_layout: FrameLayout::default(),
            row_bytes: 16,
        }
    }
}
