//! Android Storage Access Framework provider
//!
//! Talks to `androidx.documentfile.provider.DocumentFile` and
//! `android.provider.DocumentsContract` over JNI. Streams are opened as raw
//! file descriptors through `ContentResolver.openFileDescriptor`, so reads and
//! writes never cross back into Java.

use super::{DocumentProvider, DocumentReader, DocumentRef, DocumentWriter, WriteMode};
use crate::grant::{ActivityLauncher, TreeRequest};
use jni::objects::{JObject, JObjectArray, JString, JValue};
use jni::{JNIEnv, JavaVM};
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;

const CONTENT_SCHEME: &str = "content://";
const ACTION_OPEN_DOCUMENT_TREE: &str = "android.intent.action.OPEN_DOCUMENT_TREE";
const LOCAL_FRAME_CAPACITY: i32 = 64;

const DOCUMENT_FILE: &str = "androidx/documentfile/provider/DocumentFile";
const DOCUMENTS_CONTRACT: &str = "android/provider/DocumentsContract";

/// Run JNI calls against the application context inside a local reference frame.
///
/// A pending Java exception is cleared and reported as an IO error.
pub(crate) fn with_jni<F, T>(f: F) -> io::Result<T>
where
    F: FnOnce(&mut JNIEnv, &JObject) -> Result<T, jni::errors::Error>,
{
    let ctx = ndk_context::android_context();
    let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }.map_err(jni_error)?;
    let mut env = vm.attach_current_thread().map_err(jni_error)?;
    let context = unsafe { JObject::from_raw(ctx.context().cast()) };

    match env.with_local_frame(LOCAL_FRAME_CAPACITY, |env| f(env, &context)) {
        Ok(result) => Ok(result),
        Err(e) => {
            if env.exception_check().unwrap_or(false) {
                let _ = env.exception_describe();
                let _ = env.exception_clear();
            }
            log::error!("JNI error: {e}");
            Err(jni_error(e))
        }
    }
}

fn jni_error(e: jni::errors::Error) -> io::Error {
    io::Error::other(format!("JNI error: {e}"))
}

fn parse_uri<'local>(env: &mut JNIEnv<'local>, uri: &str) -> jni::errors::Result<JObject<'local>> {
    let text = env.new_string(uri)?;
    env.call_static_method(
        "android/net/Uri",
        "parse",
        "(Ljava/lang/String;)Landroid/net/Uri;",
        &[(&text).into()],
    )?
    .l()
}

fn java_string(env: &mut JNIEnv, object: JObject) -> jni::errors::Result<Option<String>> {
    if object.is_null() {
        return Ok(None);
    }
    let text = JString::from(object);
    let value: String = env.get_string(&text)?.into();
    Ok(Some(value))
}

fn uri_string(env: &mut JNIEnv, uri: &JObject) -> jni::errors::Result<String> {
    let text = env
        .call_method(uri, "toString", "()Ljava/lang/String;", &[])?
        .l()?;
    Ok(java_string(env, text)?.unwrap_or_default())
}

fn document_uri(env: &mut JNIEnv, document: &JObject) -> jni::errors::Result<String> {
    let uri = env
        .call_method(document, "getUri", "()Landroid/net/Uri;", &[])?
        .l()?;
    uri_string(env, &uri)
}

/// `DocumentFile` for `uri`, probing whether it names a tree or a single document
fn document_file<'local>(
    env: &mut JNIEnv<'local>,
    context: &JObject,
    uri: &str,
) -> jni::errors::Result<JObject<'local>> {
    let uri = parse_uri(env, uri)?;
    let is_tree = env
        .call_static_method(
            DOCUMENTS_CONTRACT,
            "isTreeUri",
            "(Landroid/net/Uri;)Z",
            &[JValue::Object(&uri)],
        )?
        .z()?;
    let factory = if is_tree { "fromTreeUri" } else { "fromSingleUri" };
    env.call_static_method(
        DOCUMENT_FILE,
        factory,
        "(Landroid/content/Context;Landroid/net/Uri;)Landroidx/documentfile/provider/DocumentFile;",
        &[JValue::Object(context), JValue::Object(&uri)],
    )?
    .l()
}

fn bool_method(env: &mut JNIEnv, document: &JObject, name: &str) -> jni::errors::Result<bool> {
    env.call_method(document, name, "()Z", &[])?.z()
}

fn long_method(env: &mut JNIEnv, document: &JObject, name: &str) -> jni::errors::Result<i64> {
    env.call_method(document, name, "()J", &[])?.j()
}

fn content_resolver<'local>(
    env: &mut JNIEnv<'local>,
    context: &JObject,
) -> jni::errors::Result<JObject<'local>> {
    env.call_method(
        context,
        "getContentResolver",
        "()Landroid/content/ContentResolver;",
        &[],
    )?
    .l()
}

/// Document id of the parent of `document_id`, staying inside `tree_id`.
///
/// Works for providers whose document ids are paths, such as
/// `com.android.externalstorage.documents` (`primary:Games/saves`).
pub(crate) fn parent_document_id(tree_id: &str, document_id: &str) -> Option<String> {
    let inside = document_id
        .strip_prefix(tree_id)
        .is_some_and(|rest| rest.starts_with('/') || (tree_id.ends_with(':') && !rest.is_empty()));
    if !inside {
        return None;
    }
    let parent = match document_id.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        // "primary:Games" sits directly below the volume root "primary:"
        None => document_id
            .split_once(':')
            .map(|(volume, _)| format!("{volume}:"))?,
    };
    parent.starts_with(tree_id).then_some(parent)
}

fn refused(action: &str, doc: &DocumentRef) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("document provider refused to {action} {doc}"),
    )
}

/// Documents reachable through the Storage Access Framework
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidProvider;

impl AndroidProvider {
    pub fn new() -> Self {
        Self
    }

    /// Run `f` against the `DocumentFile` for `doc`; `None` if it could not be built
    fn with_document<F, T>(&self, doc: &DocumentRef, f: F) -> io::Result<Option<T>>
    where
        F: FnOnce(&mut JNIEnv, &JObject) -> Result<T, jni::errors::Error>,
    {
        with_jni(|env, context| {
            let document = document_file(env, context, doc.as_str())?;
            if document.is_null() {
                return Ok(None);
            }
            f(env, &document).map(Some)
        })
    }

    /// Query that reports `T::default()` when anything goes wrong
    fn query<F, T>(&self, doc: &DocumentRef, f: F) -> T
    where
        F: FnOnce(&mut JNIEnv, &JObject) -> Result<T, jni::errors::Error>,
        T: Default,
    {
        match self.with_document(doc, f) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                log::debug!("Query on {doc} failed: {e}");
                T::default()
            }
        }
    }

    fn open_descriptor(&self, doc: &DocumentRef, mode: &str) -> io::Result<File> {
        let fd = with_jni(|env, context| {
            let resolver = content_resolver(env, context)?;
            let uri = parse_uri(env, doc.as_str())?;
            let mode = env.new_string(mode)?;
            let descriptor = env
                .call_method(
                    &resolver,
                    "openFileDescriptor",
                    "(Landroid/net/Uri;Ljava/lang/String;)Landroid/os/ParcelFileDescriptor;",
                    &[JValue::Object(&uri), (&mode).into()],
                )?
                .l()?;
            if descriptor.is_null() {
                return Ok(None);
            }
            env.call_method(&descriptor, "detachFd", "()I", &[])?
                .i()
                .map(Some)
        })?
        .ok_or_else(|| refused("open", doc))?;

        // The descriptor was detached, so ownership moves to the File
        Ok(unsafe { File::from_raw_fd(fd) })
    }
}

impl DocumentProvider for AndroidProvider {
    fn resolve(&self, uri: &str) -> io::Result<DocumentRef> {
        if !uri.starts_with(CONTENT_SCHEME) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a content URI: {uri}"),
            ));
        }
        let doc = DocumentRef::new(uri);
        let found = self
            .with_document(&doc, |env, document| {
                let exists = bool_method(env, document, "exists")?;
                Ok(exists.then(|| document_uri(env, document)).transpose()?)
            })
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        match found {
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a document URI: {uri}"),
            )),
            Some(None) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{uri} does not exist"),
            )),
            Some(Some(canonical)) => Ok(DocumentRef::new(canonical)),
        }
    }

    fn exists(&self, doc: &DocumentRef) -> bool {
        self.query(doc, |env, document| bool_method(env, document, "exists"))
    }

    fn is_directory(&self, doc: &DocumentRef) -> bool {
        self.query(doc, |env, document| bool_method(env, document, "isDirectory"))
    }

    fn is_file(&self, doc: &DocumentRef) -> bool {
        self.query(doc, |env, document| bool_method(env, document, "isFile"))
    }

    fn can_read(&self, doc: &DocumentRef) -> bool {
        self.query(doc, |env, document| bool_method(env, document, "canRead"))
    }

    fn display_name(&self, doc: &DocumentRef) -> Option<String> {
        self.query(doc, |env, document| {
            let name = env
                .call_method(document, "getName", "()Ljava/lang/String;", &[])?
                .l()?;
            java_string(env, name)
        })
    }

    fn length(&self, doc: &DocumentRef) -> u64 {
        self.query(doc, |env, document| long_method(env, document, "length"))
            .max(0) as u64
    }

    fn last_modified(&self, doc: &DocumentRef) -> u64 {
        self.query(doc, |env, document| {
            long_method(env, document, "lastModified")
        })
        .max(0) as u64
    }

    fn parent(&self, doc: &DocumentRef) -> Option<DocumentRef> {
        let parent = with_jni(|env, context| {
            let uri = parse_uri(env, doc.as_str())?;
            let is_document = env
                .call_static_method(
                    DOCUMENTS_CONTRACT,
                    "isDocumentUri",
                    "(Landroid/content/Context;Landroid/net/Uri;)Z",
                    &[JValue::Object(context), JValue::Object(&uri)],
                )?
                .z()?;
            if !is_document {
                return Ok(None);
            }

            let tree_id = env
                .call_static_method(
                    DOCUMENTS_CONTRACT,
                    "getTreeDocumentId",
                    "(Landroid/net/Uri;)Ljava/lang/String;",
                    &[JValue::Object(&uri)],
                )?
                .l()?;
            let document_id = env
                .call_static_method(
                    DOCUMENTS_CONTRACT,
                    "getDocumentId",
                    "(Landroid/net/Uri;)Ljava/lang/String;",
                    &[JValue::Object(&uri)],
                )?
                .l()?;
            let (Some(tree_id), Some(document_id)) =
                (java_string(env, tree_id)?, java_string(env, document_id)?)
            else {
                return Ok(None);
            };
            let Some(parent_id) = parent_document_id(&tree_id, &document_id) else {
                return Ok(None);
            };

            let parent_id = env.new_string(parent_id)?;
            let parent = env
                .call_static_method(
                    DOCUMENTS_CONTRACT,
                    "buildDocumentUriUsingTree",
                    "(Landroid/net/Uri;Ljava/lang/String;)Landroid/net/Uri;",
                    &[JValue::Object(&uri), (&parent_id).into()],
                )?
                .l()?;
            uri_string(env, &parent).map(Some)
        });

        match parent {
            Ok(parent) => parent.map(DocumentRef::new),
            Err(e) => {
                log::debug!("Could not find parent of {doc}: {e}");
                None
            }
        }
    }

    fn list_children(&self, doc: &DocumentRef) -> io::Result<Vec<DocumentRef>> {
        self.with_document(doc, |env, document| {
            let files = env
                .call_method(
                    document,
                    "listFiles",
                    "()[Landroidx/documentfile/provider/DocumentFile;",
                    &[],
                )?
                .l()?;
            let files = JObjectArray::from(files);
            let count = env.get_array_length(&files)?;
            let mut children = Vec::with_capacity(count as usize);
            for i in 0..count {
                let child = env.get_object_array_element(&files, i)?;
                children.push(DocumentRef::new(document_uri(env, &child)?));
                env.delete_local_ref(child)?;
            }
            Ok(children)
        })?
        .ok_or_else(|| refused("list", doc))
    }

    fn find_child(&self, parent: &DocumentRef, name: &str) -> io::Result<Option<DocumentRef>> {
        Ok(self
            .with_document(parent, |env, document| {
                let name = env.new_string(name)?;
                let child = env
                    .call_method(
                        document,
                        "findFile",
                        "(Ljava/lang/String;)Landroidx/documentfile/provider/DocumentFile;",
                        &[(&name).into()],
                    )?
                    .l()?;
                if child.is_null() {
                    return Ok(None);
                }
                document_uri(env, &child).map(Some)
            })?
            .flatten()
            .map(DocumentRef::new))
    }

    fn create_file(
        &self,
        parent: &DocumentRef,
        mime_type: &str,
        name: &str,
    ) -> io::Result<DocumentRef> {
        self.with_document(parent, |env, document| {
            let mime_type = env.new_string(mime_type)?;
            let name = env.new_string(name)?;
            let created = env
                .call_method(
                    document,
                    "createFile",
                    "(Ljava/lang/String;Ljava/lang/String;)Landroidx/documentfile/provider/DocumentFile;",
                    &[(&mime_type).into(), (&name).into()],
                )?
                .l()?;
            if created.is_null() {
                return Ok(None);
            }
            document_uri(env, &created).map(Some)
        })?
        .flatten()
        .map(DocumentRef::new)
        .ok_or_else(|| refused(&format!("create {name} in"), parent))
    }

    fn create_directory(&self, parent: &DocumentRef, name: &str) -> io::Result<DocumentRef> {
        self.with_document(parent, |env, document| {
            let name = env.new_string(name)?;
            let created = env
                .call_method(
                    document,
                    "createDirectory",
                    "(Ljava/lang/String;)Landroidx/documentfile/provider/DocumentFile;",
                    &[(&name).into()],
                )?
                .l()?;
            if created.is_null() {
                return Ok(None);
            }
            document_uri(env, &created).map(Some)
        })?
        .flatten()
        .map(DocumentRef::new)
        .ok_or_else(|| refused(&format!("create directory {name} in"), parent))
    }

    fn delete(&self, doc: &DocumentRef) -> io::Result<()> {
        let deleted = self.with_document(doc, |env, document| bool_method(env, document, "delete"))?;
        if deleted == Some(true) {
            Ok(())
        } else {
            Err(refused("delete", doc))
        }
    }

    fn rename(&self, doc: &DocumentRef, new_name: &str) -> io::Result<DocumentRef> {
        self.with_document(doc, |env, document| {
            let new_name = env.new_string(new_name)?;
            let renamed = env
                .call_method(
                    document,
                    "renameTo",
                    "(Ljava/lang/String;)Z",
                    &[(&new_name).into()],
                )?
                .z()?;
            // renameTo swaps the DocumentFile over to the renamed document's URI
            if !renamed {
                return Ok(None);
            }
            document_uri(env, document).map(Some)
        })?
        .flatten()
        .map(DocumentRef::new)
        .ok_or_else(|| refused(&format!("rename to {new_name}"), doc))
    }

    fn open_input(&self, doc: &DocumentRef) -> io::Result<DocumentReader> {
        Ok(Box::new(self.open_descriptor(doc, "r")?))
    }

    fn open_output(&self, doc: &DocumentRef, mode: WriteMode) -> io::Result<DocumentWriter> {
        Ok(Box::new(self.open_descriptor(doc, mode.as_mode_str())?))
    }
}

/// Launches the system document tree picker from the current activity
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidActivityLauncher;

impl ActivityLauncher for AndroidActivityLauncher {
    fn launch_tree_picker(&self, request: &TreeRequest) -> io::Result<()> {
        with_jni(|env, context| {
            let action = env.new_string(ACTION_OPEN_DOCUMENT_TREE)?;
            let intent = env.new_object(
                "android/content/Intent",
                "(Ljava/lang/String;)V",
                &[(&action).into()],
            )?;
            env.call_method(
                &intent,
                "addFlags",
                "(I)Landroid/content/Intent;",
                &[JValue::Int(request.flags)],
            )?;
            // The context handed to native code is the hosting activity
            env.call_method(
                context,
                "startActivityForResult",
                "(Landroid/content/Intent;I)V",
                &[JValue::Object(&intent), JValue::Int(request.request_code)],
            )?;
            Ok(())
        })
    }

    fn take_persistable_permission(&self, uri: &str, flags: i32) -> io::Result<()> {
        with_jni(|env, context| {
            let resolver = content_resolver(env, context)?;
            let uri = parse_uri(env, uri)?;
            env.call_method(
                &resolver,
                "takePersistableUriPermission",
                "(Landroid/net/Uri;I)V",
                &[JValue::Object(&uri), JValue::Int(flags)],
            )?;
            Ok(())
        })
    }
}
