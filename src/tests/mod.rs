pub mod support;

pub mod decoder_tests;
pub mod receiver_tests;
