use std::process::ExitCode;

use client::UploadParams;

pub async fn upload_photo(params: UploadParams) -> ExitCode {
    match client::upload_photo(&params).await {
        Ok(report) => {
            println!("{}", client::describe_report(&report));
            if report.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("upload error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn list_photos(uri: &str) -> ExitCode {
    match client::list_photos(uri).await {
        Ok(gallery) => {
            if let Some(notice) = &gallery.notice {
                println!("{notice}");
            }
            println!("{}", client::gallery_table(&gallery));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("list error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn show_photo(uri: &str, name: &str) -> ExitCode {
    match client::photo_details(uri, name).await {
        Ok(photo) => {
            println!("{}", client::photo_table(&photo));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("show error: {e}");
            ExitCode::FAILURE
        }
    }
}
