use metrics::{describe_counter, describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "nanopore_segmentation_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub fn describe_metrics() {
    describe_counter!(names::CHUNKS_PROCESSED, "Signal chunks read and scanned");
    describe_counter!(names::EVENTS_FOUND, "Events found, by classification");
    describe_counter!(names::FAILURES, "Failures by error code");
    describe_counter!(names::SAMPLES_PROCESSED, "Samples passed through the scanner");
}

pub mod names {
    pub const CHUNKS_PROCESSED: &str = "nanopore_segmentation_chunks_processed";
    pub const EVENTS_FOUND: &str = "nanopore_segmentation_events_found";
    pub const FAILURES: &str = "nanopore_segmentation_failures";
    pub const SAMPLES_PROCESSED: &str = "nanopore_segmentation_samples_processed";
}

pub mod events_found {
    // Label building function
    pub fn get_label(class: &str) -> (&'static str, String) {
        ("event_class", class.to_owned())
    }
}

pub mod failures {
    // Label building function
    pub fn get_label(code: &str) -> (&'static str, String) {
        ("error_code", code.to_owned())
    }
}
