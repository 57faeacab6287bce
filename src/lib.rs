pub mod core {
    pub mod config;
    pub mod error;
    pub mod routes;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod broadcast {
    pub mod channel;
    pub mod registry;
}

pub mod directory {
    pub mod key_directory;
    pub mod ssh;
}

pub mod handlers {
    pub mod fallback;
    pub mod health;
    pub mod metrics;
    pub mod server_keys;
    pub mod servers;
    pub mod stream;
    pub mod users;
}

pub mod metrics {
    pub mod collector;
}

pub mod models {
    pub mod admin;
    pub mod server;
    pub mod user;
}

pub mod persistence {
    pub mod json_file;
}

pub mod stores {
    pub mod collection;
    pub mod record_store;
}

pub mod utils {
    pub mod auth;
    pub mod time;
}
