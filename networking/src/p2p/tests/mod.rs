mod broadcaster_tests;
mod mocks;
