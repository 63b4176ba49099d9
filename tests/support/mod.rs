#![allow(dead_code)]

pub mod loopback;
pub mod portal;
