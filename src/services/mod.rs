pub mod lifecycle;
pub mod mechanics;
pub mod realtime;
pub mod storage;
pub mod validation;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;
