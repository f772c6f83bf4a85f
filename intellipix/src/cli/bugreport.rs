use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            "INTELLIPIX_DATA_DIR",
            "INTELLIPIX_DATA_FILE",
            "INTELLIPIX_PORT",
            "INTELLIPIX_PUBLIC_URL",
            "INTELLIPIX_PRINCIPAL_HEADER",
            "VISION_ENDPOINT",
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
