mod coordinator;
mod token;

pub use coordinator::QuorumRwLock;
pub use token::WriteToken;
