#![doc = include_str!("../README.md")]

use anyhow::Context;
use blog_tonic_core::{
    ErrorKind,
    proto::{
        Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
        UpdateBlogRequest, blog_service_client::BlogServiceClient,
    },
    types::DEFAULT_ENDPOINT,
};
use clap::Parser;
use tokio_stream::StreamExt;
use tonic::{Status, transport::Channel};

/// Id that is well formed but never assigned to a record.
const UNKNOWN_BLOG_ID: &str = "5c54b08ebe020342da2b13a8";

#[derive(Parser, Debug)]
#[command(
    name = "blog-tonic-client",
    version,
    about = "Runs each blog service call once against a server"
)]
struct Args {
    /// Server endpoint.
    ///
    /// Environment variable: `BLOG_ENDPOINT`
    #[arg(long, env = "BLOG_ENDPOINT", default_value_t = String::from(DEFAULT_ENDPOINT))]
    endpoint: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let channel = Channel::from_shared(args.endpoint.clone())?
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.endpoint))?;
    let mut client = BlogServiceClient::new(channel);

    println!("=== Create ===");
    let created = client
        .create_blog(CreateBlogRequest {
            blog: Some(Blog::draft(
                "Clement",
                "My First Blog",
                "Content of the first blog",
            )),
        })
        .await
        .map_err(|status| failure("create", &status))?
        .into_inner()
        .blog
        .context("create response carried no blog")?;
    println!("Blog has been created: {}", created.id);

    println!("\n=== Read ===");
    read(&mut client, &created.id).await;
    read(&mut client, UNKNOWN_BLOG_ID).await;

    println!("\n=== Update ===");
    let updated = client
        .update_blog(UpdateBlogRequest {
            blog: Some(
                Blog::draft(
                    "Changed Author",
                    "My First Blog (edited)",
                    "Content of the first blog, with some awesome additions!",
                )
                .with_id(created.id.clone()),
            ),
        })
        .await
        .map_err(|status| failure("update", &status))?
        .into_inner()
        .blog;
    println!("Blog was updated: {updated:?}");

    println!("\n=== Delete ===");
    match client
        .delete_blog(DeleteBlogRequest {
            blog_id: created.id.clone(),
        })
        .await
    {
        Ok(resp) => println!("Blog was deleted: {}", resp.into_inner().blog_id),
        Err(status) => println!("{}", failure("delete", &status)),
    }

    println!("\n=== List ===");
    let mut stream = client
        .list_blog(ListBlogRequest {})
        .await
        .map_err(|status| failure("list", &status))?
        .into_inner();
    let mut listed = 0usize;
    while let Some(resp) = stream.next().await {
        let blog = resp.map_err(|status| failure("list", &status))?.blog;
        println!("{blog:?}");
        listed += 1;
    }
    println!("Listed {listed} blog(s)");

    Ok(())
}

async fn read(client: &mut BlogServiceClient<Channel>, blog_id: &str) {
    match client
        .read_blog(ReadBlogRequest {
            blog_id: blog_id.to_owned(),
        })
        .await
    {
        Ok(resp) => println!("Blog was read: {:?}", resp.into_inner().blog),
        Err(status) => println!("{}", failure("read", &status)),
    }
}

/// Describes a failed call by its kind rather than its raw status code.
fn failure(call: &str, status: &Status) -> anyhow::Error {
    anyhow::anyhow!(
        "{call} failed ({}): {}",
        ErrorKind::from(status).as_str(),
        status.message()
    )
}
