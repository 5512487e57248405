pub mod ecs {
    pub use ard_ecs::*;
}

pub mod log {
    pub use ard_log::*;
}

pub mod save_load {
    pub use ard_save_load::*;
}
