mod common;
mod provider_tests;
mod requester_tests;
