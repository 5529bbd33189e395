mod pipeline_tests;
mod weiterleitung_tests;
