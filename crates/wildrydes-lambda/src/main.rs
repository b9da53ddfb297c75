//! AWS Lambda function for ride requests.

use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    wildrydes_lambda::run().await
}
