use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MctsError {
    #[error("search tree arena exhausted ({capacity} nodes)")]
    ArenaExhausted { capacity: usize },
    #[error("search cancelled before completion")]
    Cancelled,
    #[error(transparent)]
    Game(#[from] pente_core::PenteError),
}
