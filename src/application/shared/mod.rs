pub mod mappers;
pub mod timeout;
#[cfg(test)]
pub mod tests;

pub use timeout::bounded;
