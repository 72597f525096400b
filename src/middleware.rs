pub mod webhook_token;
