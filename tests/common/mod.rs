#![allow(dead_code)]

pub mod fixtures {
    use brrtguard::spec::{load_spec_str, ApiDocument};

    /// Swagger 2.0 pet store exercising api keys, basic, oauth2 and ownership rules
    pub const PET_STORE_SWAGGER2: &str = r##"
swagger: "2.0"
info: { title: Pet Store, version: "1.0" }
produces: [application/json]
securityDefinitions:
  api_key: { type: apiKey, in: header, name: X-Api-Key }
  basic: { type: basic }
  petstore_auth:
    type: oauth2
    flow: implicit
    authorizationUrl: https://example.com/auth
    scopes: { "read:pets": read, "write:pets": write }
  admin_auth:
    type: oauth2
    flow: application
    tokenUrl: https://example.com/token
    scopes: { admin: admin }
paths:
  /pets:
    get:
      operationId: list_pets
      security:
        - api_key: []
        - petstore_auth: ["read:pets"]
      parameters:
        - { name: letters, in: query, type: array, items: { type: string }, collectionFormat: csv }
        - { name: limit, in: query, type: integer }
      responses:
        "200":
          description: ok
          schema:
            type: array
            items: { $ref: "#/definitions/Pet" }
          headers:
            X-Rate-Limit: { type: integer, required: true }
          x-ft-security:
            authenticated-principal-path: sub
            resource-authorized-principal-path: owner
            resource-content-format: list
  /pets/{id}:
    parameters:
      - { name: id, in: path, required: true, type: integer }
    get:
      operationId: get_pet
      security:
        - basic: []
      responses:
        "200":
          description: ok
          schema: { $ref: "#/definitions/Pet" }
          x-ft-security:
            authenticated-principal-path: sub
            resource-authorized-principal-path: owner
        default: { description: error }
    delete:
      operationId: delete_pet
      security:
        - petstore_auth: ["write:pets"]
          admin_auth: [admin]
      responses:
        "204": { description: gone }
  /health:
    get:
      security: []
      responses:
        "200": { description: ok }
definitions:
  Pet:
    type: object
    required: [id, name]
    properties:
      id: { type: integer }
      name: { type: string }
      owner: { type: string }
"##;

    /// OpenAPI 3 document with bearer, cookie and unsupported schemes
    pub const ORDERS_OAS3: &str = r##"
openapi: 3.0.3
info: { title: Orders, version: "1.0" }
components:
  securitySchemes:
    bearer: { type: http, scheme: bearer, bearerFormat: JWT }
    digest: { type: http, scheme: digest }
    session: { type: apiKey, in: cookie, name: session }
  schemas:
    Order:
      type: object
      required: [id, owner]
      properties:
        id: { type: string }
        owner:
          type: object
          properties:
            id: { type: string }
security:
  - bearer: []
paths:
  /orders/{id}:
    get:
      operationId: get_order
      parameters:
        - { name: id, in: path, required: true, schema: { type: string } }
        - name: filter
          in: query
          style: deepObject
          explode: true
          schema:
            type: object
            properties:
              status: { type: string }
              limit: { type: integer }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: { $ref: "#/components/schemas/Order" }
          x-ft-security:
            authenticated-principal-path: sub
            resource-authorized-principal-path: owner.id
            access-resolver: order_owner
  /orders:
    get:
      operationId: list_orders
      security:
        - digest: []
        - session: []
      responses:
        "200":
          description: ok
          content:
            text/plain:
              schema: { type: string, maxLength: 5 }
"##;

    pub fn pet_store() -> ApiDocument {
        load_spec_str(PET_STORE_SWAGGER2).expect("pet store fixture should load")
    }

    pub fn orders() -> ApiDocument {
        load_spec_str(ORDERS_OAS3).expect("orders fixture should load")
    }
}

pub mod temp_files {
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write `content` into a fresh temp dir; keep the dir alive while the file is used
    pub fn write_spec(content: &str, file_name: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(file_name);
        std::fs::write(&path, content).expect("write spec");
        (dir, path)
    }
}
