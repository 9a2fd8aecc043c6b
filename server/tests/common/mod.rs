#![allow(dead_code)]

mod mock_client;

pub use mock_client::TestClient;
