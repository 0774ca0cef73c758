pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod routes;
pub mod flow;
pub mod identity;

pub mod crypto {
    pub mod csrf;
}

pub mod models {
    pub mod connection;
    pub mod notice;
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod connection;
    pub mod user;
}

pub mod services {
    pub mod auth;
}

pub mod handlers {
    pub mod auth;
    pub mod connections;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
}

pub mod validation {
    pub mod auth;
}
