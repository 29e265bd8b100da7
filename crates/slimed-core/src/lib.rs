pub mod anim;
pub mod config;
pub mod effects;
pub mod geom;
pub mod modes;
pub mod persistence;
pub mod render;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::cell::RefCell;

    use crate::persistence::{
        Leaderboard, Persistence, PersistenceError, SaveData, Settings,
    };

    /// In-memory persistence backend for tests. Stores whole documents,
    /// counting writes so tests can assert "persisted exactly once".
    #[derive(Default)]
    pub struct MemoryStore {
        pub save: RefCell<SaveData>,
        pub leaderboard: RefCell<Leaderboard>,
        pub settings: RefCell<Settings>,
        pub save_writes: RefCell<u32>,
        pub leaderboard_writes: RefCell<u32>,
    }

    impl Persistence for MemoryStore {
        fn load_save(&self) -> SaveData {
            self.save.borrow().clone()
        }

        fn save_save(&self, data: &SaveData) -> Result<(), PersistenceError> {
            *self.save.borrow_mut() = data.clone();
            *self.save_writes.borrow_mut() += 1;
            Ok(())
        }

        fn load_leaderboard(&self) -> Leaderboard {
            self.leaderboard.borrow().clone()
        }

        fn save_leaderboard(&self, lb: &Leaderboard) -> Result<(), PersistenceError> {
            *self.leaderboard.borrow_mut() = lb.clone();
            *self.leaderboard_writes.borrow_mut() += 1;
            Ok(())
        }

        fn load_settings(&self) -> Settings {
            self.settings.borrow().clone()
        }

        fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
            *self.settings.borrow_mut() = settings.clone();
            Ok(())
        }
    }
}
