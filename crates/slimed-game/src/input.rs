/// Key state for one player for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    /// Slam or dash, depending on the character's ability.
    pub ability: bool,
}

impl FrameInput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        self.left || self.right || self.jump || self.ability
    }
}
