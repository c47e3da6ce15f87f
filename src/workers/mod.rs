pub mod credential_cleanup;
