#![allow(dead_code)]

pub mod app_home;
pub mod fake_server;
